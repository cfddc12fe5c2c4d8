//! Position of a quad in one face's quadtree.

use serde::{Deserialize, Serialize};

use crate::{CubeFace, FaceCoord};

/// Child slot of a quad inside its parent.
///
/// Children are stored in this order: `[(x, y), (x+1, y), (x, y+1), (x+1, y+1)]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    /// Low `u`, low `v`.
    SouthWest = 0,
    /// High `u`, low `v`.
    SouthEast = 1,
    /// Low `u`, high `v`.
    NorthWest = 2,
    /// High `u`, high `v`.
    NorthEast = 3,
}

impl Quadrant {
    /// All quadrants in child-array order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::SouthWest,
        Quadrant::SouthEast,
        Quadrant::NorthWest,
        Quadrant::NorthEast,
    ];

    /// Offset of this quadrant in child-level grid cells.
    #[must_use]
    pub fn offset(self) -> (u32, u32) {
        match self {
            Quadrant::SouthWest => (0, 0),
            Quadrant::SouthEast => (1, 0),
            Quadrant::NorthWest => (0, 1),
            Quadrant::NorthEast => (1, 1),
        }
    }
}

/// Identifies a quad on the cube sphere.
///
/// Level 0 is the whole face. At level `l` the face is split into a
/// `2^l × 2^l` grid and `(tx, ty)` index a cell of that grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuadAddress {
    /// Face the quad lies on.
    pub face: CubeFace,
    /// Quadtree depth (0 = root).
    pub level: u8,
    /// Column in the level's grid.
    pub tx: u32,
    /// Row in the level's grid.
    pub ty: u32,
}

impl QuadAddress {
    /// Deepest level addressable with 32-bit grid coordinates.
    pub const MAX_LEVEL: u8 = 30;

    /// Number of cells along one axis at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`Self::MAX_LEVEL`].
    #[must_use]
    pub fn grid_size(level: u8) -> u32 {
        assert!(
            level <= Self::MAX_LEVEL,
            "level {level} exceeds MAX_LEVEL {}",
            Self::MAX_LEVEL
        );
        1u32 << level
    }

    /// Build an address, checking `tx`/`ty` against the level's grid.
    ///
    /// # Panics
    ///
    /// Panics if the level is too deep or the coordinates are out of range.
    #[must_use]
    pub fn new(face: CubeFace, level: u8, tx: u32, ty: u32) -> Self {
        let size = Self::grid_size(level);
        assert!(tx < size, "tx={tx} out of range for level {level} (size {size})");
        assert!(ty < size, "ty={ty} out of range for level {level} (size {size})");
        Self { face, level, tx, ty }
    }

    /// The root quad covering all of `face`.
    #[must_use]
    pub fn root(face: CubeFace) -> Self {
        Self {
            face,
            level: 0,
            tx: 0,
            ty: 0,
        }
    }

    /// `(u_min, v_min, u_max, v_max)` of the quad on its face.
    #[must_use]
    pub fn uv_bounds(&self) -> (f64, f64, f64, f64) {
        let size = f64::from(Self::grid_size(self.level));
        (
            f64::from(self.tx) / size,
            f64::from(self.ty) / size,
            f64::from(self.tx + 1) / size,
            f64::from(self.ty + 1) / size,
        )
    }

    /// Face coordinate of the quad's center.
    #[must_use]
    pub fn center(&self) -> FaceCoord {
        let (u0, v0, u1, v1) = self.uv_bounds();
        FaceCoord::new(self.face, (u0 + u1) * 0.5, (v0 + v1) * 0.5)
    }

    /// The four corners, in quadrant order.
    #[must_use]
    pub fn corners(&self) -> [FaceCoord; 4] {
        let (u0, v0, u1, v1) = self.uv_bounds();
        [
            FaceCoord::new(self.face, u0, v0),
            FaceCoord::new(self.face, u1, v0),
            FaceCoord::new(self.face, u0, v1),
            FaceCoord::new(self.face, u1, v1),
        ]
    }

    /// Enclosing quad one level up, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<QuadAddress> {
        (self.level > 0).then(|| QuadAddress {
            face: self.face,
            level: self.level - 1,
            tx: self.tx / 2,
            ty: self.ty / 2,
        })
    }

    /// Which quadrant of its parent this quad occupies, or `None` for a root.
    #[must_use]
    pub fn quadrant(&self) -> Option<Quadrant> {
        if self.level == 0 {
            return None;
        }
        Some(match (self.tx % 2, self.ty % 2) {
            (0, 0) => Quadrant::SouthWest,
            (1, 0) => Quadrant::SouthEast,
            (0, _) => Quadrant::NorthWest,
            _ => Quadrant::NorthEast,
        })
    }

    /// The child in `quadrant`, one level down.
    ///
    /// # Panics
    ///
    /// Panics if this quad is already at [`Self::MAX_LEVEL`].
    #[must_use]
    pub fn child(&self, quadrant: Quadrant) -> QuadAddress {
        assert!(
            self.level < Self::MAX_LEVEL,
            "cannot subdivide below level {}",
            Self::MAX_LEVEL
        );
        let (dx, dy) = quadrant.offset();
        QuadAddress {
            face: self.face,
            level: self.level + 1,
            tx: self.tx * 2 + dx,
            ty: self.ty * 2 + dy,
        }
    }

    /// All four children in quadrant order.
    #[must_use]
    pub fn children(&self) -> [QuadAddress; 4] {
        Quadrant::ALL.map(|q| self.child(q))
    }
}

impl std::fmt::Display for QuadAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, level={}, tx={}, ty={})", self.face, self.level, self.tx, self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_covers_face() {
        let root = QuadAddress::root(CubeFace::Left);
        assert_eq!(root.uv_bounds(), (0.0, 0.0, 1.0, 1.0));
        assert!(root.parent().is_none());
        assert!(root.quadrant().is_none());
    }

    #[test]
    fn test_children_are_one_level_deeper() {
        let parent = QuadAddress::new(CubeFace::Front, 3, 5, 2);
        for child in parent.children() {
            assert_eq!(child.level, 4);
            assert_eq!(child.parent(), Some(parent));
        }
    }

    #[test]
    fn test_children_tile_parent_exactly() {
        let parent = QuadAddress::new(CubeFace::Back, 2, 1, 3);
        let (pu0, pv0, pu1, pv1) = parent.uv_bounds();
        let children = parent.children();

        let area: f64 = children
            .iter()
            .map(|c| {
                let (u0, v0, u1, v1) = c.uv_bounds();
                (u1 - u0) * (v1 - v0)
            })
            .sum();
        assert!((area - (pu1 - pu0) * (pv1 - pv0)).abs() < 1e-12);

        // Disjoint: no two children share a grid cell.
        for (i, a) in children.iter().enumerate() {
            for b in &children[i + 1..] {
                assert_ne!((a.tx, a.ty), (b.tx, b.ty));
            }
            let (u0, v0, u1, v1) = a.uv_bounds();
            assert!(u0 >= pu0 && u1 <= pu1 && v0 >= pv0 && v1 <= pv1);
        }
    }

    #[test]
    fn test_quadrant_round_trips_through_child() {
        let parent = QuadAddress::new(CubeFace::Top, 5, 7, 9);
        for q in Quadrant::ALL {
            assert_eq!(parent.child(q).quadrant(), Some(q));
        }
    }

    #[test]
    fn test_center_is_inside_bounds() {
        let addr = QuadAddress::new(CubeFace::Right, 4, 3, 12);
        let c = addr.center();
        let (u0, v0, u1, v1) = addr.uv_bounds();
        assert!(u0 < c.u && c.u < u1);
        assert!(v0 < c.v && c.v < v1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_grid_panics() {
        let _ = QuadAddress::new(CubeFace::Top, 2, 4, 0);
    }

    #[test]
    fn test_display() {
        let s = QuadAddress::new(CubeFace::Bottom, 1, 1, 0).to_string();
        assert!(s.contains("bottom"));
        assert!(s.contains("level=1"));
    }
}
