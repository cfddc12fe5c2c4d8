//! The six faces of the planet cube and their local frames.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// One face of the cube that is inflated into the planet sphere.
///
/// Each face carries a right-handed frame: `east × north = normal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CubeFace {
    /// Face whose outward normal is +Y.
    Top = 0,
    /// Face whose outward normal is −Y.
    Bottom = 1,
    /// Face whose outward normal is −X.
    Left = 2,
    /// Face whose outward normal is +X.
    Right = 3,
    /// Face whose outward normal is +Z.
    Front = 4,
    /// Face whose outward normal is −Z.
    Back = 5,
}

impl CubeFace {
    /// All six faces, in the order root quads are created.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Top,
        CubeFace::Bottom,
        CubeFace::Left,
        CubeFace::Right,
        CubeFace::Front,
        CubeFace::Back,
    ];

    /// Outward unit normal; also the center of the face on the `[-1, 1]` cube.
    #[must_use]
    pub fn normal(self) -> DVec3 {
        match self {
            CubeFace::Top => DVec3::Y,
            CubeFace::Bottom => DVec3::NEG_Y,
            CubeFace::Left => DVec3::NEG_X,
            CubeFace::Right => DVec3::X,
            CubeFace::Front => DVec3::Z,
            CubeFace::Back => DVec3::NEG_Z,
        }
    }

    /// Direction of increasing `u` across the face.
    #[must_use]
    pub fn east(self) -> DVec3 {
        match self {
            CubeFace::Top | CubeFace::Bottom | CubeFace::Front => DVec3::X,
            CubeFace::Left => DVec3::Z,
            CubeFace::Right => DVec3::NEG_Z,
            CubeFace::Back => DVec3::NEG_X,
        }
    }

    /// Direction of increasing `v` across the face.
    #[must_use]
    pub fn north(self) -> DVec3 {
        match self {
            CubeFace::Top => DVec3::NEG_Z,
            CubeFace::Bottom => DVec3::Z,
            CubeFace::Left | CubeFace::Right | CubeFace::Front | CubeFace::Back => DVec3::Y,
        }
    }

    /// The face on the other side of the planet.
    #[must_use]
    pub fn opposite(self) -> CubeFace {
        match self {
            CubeFace::Top => CubeFace::Bottom,
            CubeFace::Bottom => CubeFace::Top,
            CubeFace::Left => CubeFace::Right,
            CubeFace::Right => CubeFace::Left,
            CubeFace::Front => CubeFace::Back,
            CubeFace::Back => CubeFace::Front,
        }
    }

    /// Stable index in `0..6`.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CubeFace::Top => "top",
            CubeFace::Bottom => "bottom",
            CubeFace::Left => "left",
            CubeFace::Right => "right",
            CubeFace::Front => "front",
            CubeFace::Back => "back",
        };
        f.write_str(name)
    }
}
