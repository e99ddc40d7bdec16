//! Tile payloads and the multi-tile navigation mesh
//!
//! This crate owns everything that happens after a tile has been polygonized:
//! packing the polygon and detail meshes into a relocatable `DNAV` blob,
//! allocating tile/polygon reference bits, assembling blobs into a
//! [`TiledNavMesh`] and flattening the assembled mesh into an `MSET` file.

mod identifier;
mod nav_mesh;
mod nav_mesh_builder;
mod nav_mesh_set;
mod status;
mod tile_data;
mod tile_geometry;


pub use identifier::{IdentifierPolicy, IdentifierSpace};
pub use nav_mesh::{MeshTile, TileState, TiledNavMesh};
pub use nav_mesh_builder::{create_nav_mesh_data, NavMeshCreateParams};
pub use nav_mesh_set::{
    export_nav_mesh, import_nav_mesh, load_from_file, read_set_header, save_to_file,
    NavMeshSetHeader, NAVMESHSET_MAGIC, NAVMESHSET_VERSION,
};
pub use status::Status;
pub use tile_data::{
    BVNode, MeshHeader, OffMeshConnection, Poly, PolyDetail, TileData, DT_NAVMESH_MAGIC,
    DT_NAVMESH_VERSION,
};
pub use tile_geometry::TileGeometry;

use bitflags::bitflags;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Neighbour flag marking an edge that links to another tile
pub const DT_EXT_LINK: u16 = 0x8000;

/// Detail triangle edge flag: edge is part of the polygon boundary
pub const DT_DETAIL_EDGE_BOUNDARY: u8 = 0x01;

/// Reference to a polygon, or to a tile when the polygon bits are zero.
///
/// Packs `salt | tile index | polygon index`; the field widths come from the
/// owning [`TiledNavMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u64);

/// Tile references share the polygon reference encoding
pub type TileRef = PolyRef;

impl PolyRef {
    /// Wraps a raw reference value
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw reference value
    pub const fn id(&self) -> u64 {
        self.0
    }

    /// Checks whether this is the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for PolyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Global parameters of a tiled navigation mesh
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World-space origin of tile (0, 0)
    pub origin: [f32; 3],
    /// Tile width along x
    pub tile_width: f32,
    /// Tile height along z
    pub tile_height: f32,
    /// Maximum number of tiles
    pub max_tiles: i32,
    /// Maximum number of polygons per tile
    pub max_polys: i32,
}

bitflags! {
    /// Traversal flags of a navigation polygon
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct PolyFlags: u16 {
        /// Ground that can be walked on
        const WALK = 0x01;
        /// Water
        const SWIM = 0x02;
        /// Doors
        const DOOR = 0x04;
        /// Disabled polygon
        const DISABLED = 0x10;
    }
}

/// Kind of a navigation polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PolyType {
    /// Regular polygon on the walkable surface
    #[default]
    Ground = 0,
    /// Two-point off-mesh connection
    OffMeshConnection = 1,
}

impl PolyType {
    /// Decodes the two type bits of a packed polygon
    pub fn from_bits(bits: u8) -> Self {
        if bits == 1 {
            PolyType::OffMeshConnection
        } else {
            PolyType::Ground
        }
    }
}
