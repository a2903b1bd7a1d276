pub mod errors;

pub use errors::{PkError, PkErrorCategory, PkResult};

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Particle species of a Gadget snapshot, or the all-matter aggregate.
///
/// The Gadget type slots are 0 gas, 1 cold dark matter, 2 neutrinos and
/// 4 stars; slots 3 and 5 are unused by the simulations this pipeline
/// targets and are only carried through mass bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Species {
    Gas,
    ColdDarkMatter,
    Neutrino,
    Stars,
    Matter,
}

impl Species {
    /// The four concrete components, in Gadget slot order.
    pub const COMPONENTS: [Species; 4] = [
        Species::Gas,
        Species::ColdDarkMatter,
        Species::Neutrino,
        Species::Stars,
    ];

    /// Gadget particle-type slot; `None` for the all-matter aggregate.
    pub const fn type_index(self) -> Option<usize> {
        match self {
            Self::Gas => Some(0),
            Self::ColdDarkMatter => Some(1),
            Self::Neutrino => Some(2),
            Self::Stars => Some(4),
            Self::Matter => None,
        }
    }

    /// Tag used in output file names.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gas => "GAS",
            Self::ColdDarkMatter => "CDM",
            Self::Neutrino => "NU",
            Self::Stars => "Stars",
            Self::Matter => "matter",
        }
    }

    /// Output tag for an unordered pair of concrete species.
    ///
    /// Returns `None` when the pair is degenerate or involves the
    /// all-matter aggregate.
    pub fn pair_label(a: Species, b: Species) -> Option<&'static str> {
        let (first, second) = match (a.type_index()?, b.type_index()?) {
            (x, y) if x < y => (a, b),
            (x, y) if x > y => (b, a),
            _ => return None,
        };
        match (first, second) {
            (Self::Gas, Self::ColdDarkMatter) => Some("GCDM"),
            (Self::Gas, Self::Neutrino) => Some("GNU"),
            (Self::Gas, Self::Stars) => Some("Gstars"),
            (Self::ColdDarkMatter, Self::Neutrino) => Some("CDMNU"),
            (Self::ColdDarkMatter, Self::Stars) => Some("CDMStars"),
            (Self::Neutrino, Self::Stars) => Some("NUStars"),
            _ => None,
        }
    }

    /// Parses a selector: species names or Gadget type numbers.
    pub fn parse(selector: &str) -> PkResult<Species> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "gas" | "0" => Ok(Self::Gas),
            "cdm" | "1" => Ok(Self::ColdDarkMatter),
            "nu" | "neutrino" | "neutrinos" | "2" => Ok(Self::Neutrino),
            "stars" | "star" | "4" => Ok(Self::Stars),
            "matter" | "all" | "-1" => Ok(Self::Matter),
            _ => Err(PkError::InvalidSpecies {
                selector: selector.to_string(),
            }),
        }
    }
}

impl Display for Species {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Real-space or redshift-space estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpaceMode {
    #[default]
    Real,
    Redshift {
        /// Line-of-sight axis the particles are displaced along (0, 1 or 2).
        axis: usize,
    },
}

impl SpaceMode {
    /// Axis handed to the estimator: the displacement axis in redshift
    /// space, axis 0 otherwise (the multipoles of an isotropic field do
    /// not depend on the choice).
    pub const fn estimator_axis(self) -> usize {
        match self {
            Self::Real => 0,
            Self::Redshift { axis } => axis,
        }
    }
}

/// One power-spectrum invocation over a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkRequest {
    pub snapshot: PathBuf,
    /// Grid resolution; the density field has `dims^3` cells.
    pub dims: usize,
    pub space: SpaceMode,
    /// Whether the snapshot is hydrodynamic (per-particle masses for the
    /// all-matter path instead of the header mass table).
    pub hydro: bool,
    /// Estimator worker threads; 0 uses the global pool.
    pub workers: usize,
    pub output_dir: PathBuf,
}

impl PkRequest {
    pub fn new(snapshot: impl Into<PathBuf>, dims: usize) -> Self {
        Self {
            snapshot: snapshot.into(),
            dims,
            space: SpaceMode::Real,
            hydro: false,
            workers: 0,
            output_dir: PathBuf::from("."),
        }
    }
}

/// A spectrum file produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkArtifact {
    /// File name relative to the request's output directory.
    pub relative_path: PathBuf,
    pub species_label: String,
    /// Number of wavenumber bins written.
    pub bins: usize,
}
