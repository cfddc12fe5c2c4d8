//! Pixel-to-sphere mapping for tiles of one cube face.

use glam::DVec3;
use tessera_cubesphere::{CubeFace, FaceCoord, ProjectionMethod, QuadAddress, project};
use tessera_tile::{ProductionError, SlotRef, TileRequest};

/// Where each pixel of a tile lies on the unit sphere.
#[derive(Clone, Copy, Debug)]
pub struct TileFrame {
    address: QuadAddress,
    request: TileRequest,
    tile_size: u32,
    projection: ProjectionMethod,
}

impl TileFrame {
    /// Frame for `request` on `face`, for slots of `tile_size` pixels.
    pub fn new(
        face: CubeFace,
        request: &TileRequest,
        tile_size: u32,
        projection: ProjectionMethod,
    ) -> Result<Self, ProductionError> {
        let level = request.level();
        if level > QuadAddress::MAX_LEVEL {
            return Err(ProductionError::InvalidLevel {
                level,
                max: QuadAddress::MAX_LEVEL,
            });
        }
        let grid = QuadAddress::grid_size(level);
        if request.tx() >= grid || request.ty() >= grid {
            return Err(ProductionError::InvalidLevel {
                level,
                max: QuadAddress::MAX_LEVEL,
            });
        }
        Ok(Self {
            address: QuadAddress::new(face, level, request.tx(), request.ty()),
            request: *request,
            tile_size,
            projection,
        })
    }

    #[must_use]
    pub fn address(&self) -> QuadAddress {
        self.address
    }

    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Face coordinate of pixel `(x, y)`. Border pixels past a face edge are
    /// clamped onto it.
    #[must_use]
    pub fn face_coord(&self, x: u32, y: u32) -> FaceCoord {
        let (u0, v0, u1, v1) = self.address.uv_bounds();
        let (lu, lv) = self.request.texel_uv(x, y, self.tile_size);
        FaceCoord::new(self.address.face, u0 + lu * (u1 - u0), v0 + lv * (v1 - v0))
    }

    /// Unit-sphere direction of pixel `(x, y)`.
    #[must_use]
    pub fn direction(&self, x: u32, y: u32) -> DVec3 {
        project(&self.face_coord(x, y), self.projection)
    }
}

/// Fail unless `slot` holds `channels` floats per pixel.
pub(crate) fn check_channels(slot: &SlotRef, channels: u32) -> Result<(), ProductionError> {
    let actual = slot.read().channels();
    if actual == channels {
        Ok(())
    } else {
        Err(ProductionError::SlotShape {
            expected: channels,
            actual,
        })
    }
}
