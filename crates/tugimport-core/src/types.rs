//! Shared types for the symbol index.
//!
//! These types cross every subsystem boundary: the index builder produces
//! [`IndexDocument`]s, the document store persists them, and the import
//! engine asks the store for a module's [`Location`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Location Tags
// ============================================================================

/// Provenance of an indexed symbol.
///
/// The declaration order is the suggestion priority and also the order of
/// import sections: `__future__` first, then the standard library, then
/// third-party packages, then workspace-local modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    /// The `__future__` pseudo-module.
    #[serde(rename = "F")]
    Future,
    /// Standard library (runtime stdlib directories and builtin modules).
    #[serde(rename = "S")]
    System,
    /// Installed third-party packages (`site-packages` / `dist-packages`).
    #[serde(rename = "3")]
    ThirdParty,
    /// Workspace code.
    #[serde(rename = "L")]
    Local,
}

impl Location {
    /// Single-character tag used in the persisted document.
    pub fn tag(&self) -> &'static str {
        match self {
            Location::Future => "F",
            Location::System => "S",
            Location::ThirdParty => "3",
            Location::Local => "L",
        }
    }

    /// Parse a persisted tag. Unknown tags fall back to third-party,
    /// the same conservative default used for unknown modules.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "F" => Location::Future,
            "S" => Location::System,
            "L" => Location::Local,
            _ => Location::ThirdParty,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

// ============================================================================
// Symbol Kinds
// ============================================================================

/// What an index entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    #[serde(rename = "M")]
    Module,
    #[serde(rename = "P")]
    Package,
    #[serde(rename = "C")]
    Class,
    #[serde(rename = "F")]
    Function,
    #[serde(rename = "V")]
    Variable,
    /// A name imported into a module from elsewhere.
    #[serde(rename = "R")]
    Reference,
}

impl SymbolKind {
    /// Single-character code stored in the index and sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            SymbolKind::Module => "M",
            SymbolKind::Package => "P",
            SymbolKind::Class => "C",
            SymbolKind::Function => "F",
            SymbolKind::Variable => "V",
            SymbolKind::Reference => "R",
        }
    }

    /// True for kinds that own a subtree in the symbol tree.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Module | SymbolKind::Package | SymbolKind::Class
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(SymbolKind::Module),
            "P" => Ok(SymbolKind::Package),
            "C" => Ok(SymbolKind::Class),
            "F" => Ok(SymbolKind::Function),
            "V" => Ok(SymbolKind::Variable),
            "R" => Ok(SymbolKind::Reference),
            other => Err(format!("unknown symbol kind code '{}'", other)),
        }
    }
}

// ============================================================================
// Scoring Weights
// ============================================================================

/// Structural weights used to rank symbols.
///
/// These are tunable; the defaults reproduce the established ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    pub module: f64,
    pub package: f64,
    pub class: f64,
    pub function: f64,
    pub variable: f64,
    pub reference: f64,
    /// Subtracted from the scale at every level of nesting.
    pub depth_decay: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            module: 1.0,
            package: 1.0,
            class: 1.1,
            function: 1.2,
            variable: 1.0,
            reference: 0.25,
            depth_decay: 0.1,
        }
    }
}

impl ScoreWeights {
    /// Structural score for a freshly created node of `kind`.
    pub fn score_for(&self, kind: SymbolKind) -> f64 {
        match kind {
            SymbolKind::Module => self.module,
            SymbolKind::Package => self.package,
            SymbolKind::Class => self.class,
            SymbolKind::Function => self.function,
            SymbolKind::Variable => self.variable,
            SymbolKind::Reference => self.reference,
        }
    }
}

// ============================================================================
// Index Documents
// ============================================================================

/// The flattened, persisted unit of the symbol index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    /// Absolute path of the file that defined the symbol.
    pub filename: String,
    /// Identifier segment, never dotted.
    pub symbol: String,
    /// Dotted path of the symbol's container (empty for top-level entries).
    pub module: String,
    pub location: Location,
    pub kind: SymbolKind,
    /// `round(structural score * depth scale * 1000)`.
    pub sort_score: i64,
}

impl IndexDocument {
    /// Compute the integer sort score from a structural score and the scale
    /// of the enclosing container.
    pub fn sort_score_for(score: f64, scale: f64) -> i64 {
        (score * scale * 1000.0).round() as i64
    }

    /// Fully qualified dotted name of the symbol.
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.symbol.clone()
        } else {
            format!("{}.{}", self.module, self.symbol)
        }
    }
}

// ============================================================================
// Location Lookup
// ============================================================================

/// Source of module locations for import grouping.
pub trait LocationLookup {
    /// Location of `module_path`, third-party when unknown.
    fn location_for(&self, module_path: &str) -> Location;
}

/// Lookup that knows no modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndex;

impl LocationLookup for NoIndex {
    fn location_for(&self, _module_path: &str) -> Location {
        Location::ThirdParty
    }
}

// ============================================================================
// Tests
// ============================================================================
