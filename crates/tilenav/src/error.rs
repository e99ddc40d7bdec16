use std::fmt;

/// Step of the single-tile pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    /// Heightfield allocation
    Allocation,
    /// Walkable classification and voxelization of base and overlay triangles
    Rasterization,
    /// Span filters
    Filtering,
    /// Compact heightfield construction
    Compaction,
    /// Erosion by the agent radius
    Erosion,
    /// Overlay area marking
    AreaMarking,
    /// Region partitioning
    Partitioning,
    /// Contour tracing
    Contours,
    /// Polygon mesh construction
    PolyMesh,
    /// Detail mesh construction
    DetailMesh,
    /// Area and flag post-processing
    AreaFlags,
    /// Packing into a tile payload
    Packing,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Allocation => "heightfield allocation",
            BuildStage::Rasterization => "rasterization",
            BuildStage::Filtering => "span filtering",
            BuildStage::Compaction => "compaction",
            BuildStage::Erosion => "erosion",
            BuildStage::AreaMarking => "area marking",
            BuildStage::Partitioning => "partitioning",
            BuildStage::Contours => "contour tracing",
            BuildStage::PolyMesh => "polygon mesh",
            BuildStage::DetailMesh => "detail mesh",
            BuildStage::AreaFlags => "area flags",
            BuildStage::Packing => "tile packing",
        };
        f.write_str(name)
    }
}

/// Why a tile produced no payload
#[derive(thiserror::Error, Debug)]
pub enum TileBuildError {
    #[error("{stage} failed: {source}")]
    Stage {
        stage: BuildStage,
        #[source]
        source: tilenav_common::Error,
    },

    #[error("tile has no walkable polygons")]
    Empty,

    #[error("cancelled before {0}")]
    Cancelled(BuildStage),
}

impl TileBuildError {
    /// Stage the error belongs to, `None` for an empty tile
    pub fn stage(&self) -> Option<BuildStage> {
        match self {
            TileBuildError::Stage { stage, .. } | TileBuildError::Cancelled(stage) => Some(*stage),
            TileBuildError::Empty => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TileBuildError::Cancelled(_))
    }

    pub(crate) fn at(stage: BuildStage) -> impl FnOnce(tilenav_common::Error) -> Self {
        move |source| TileBuildError::Stage { stage, source }
    }
}
