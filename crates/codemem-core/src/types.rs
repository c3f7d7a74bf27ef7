use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    Class,
    Function,
    Method,
    Variable,
    Documentation,
    TextChunk,
    ManualNote,
    Other(String),
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::File => "file",
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Method => "method",
            EntityType::Variable => "variable",
            EntityType::Documentation => "documentation",
            EntityType::TextChunk => "text_chunk",
            EntityType::ManualNote => "manual_note",
            EntityType::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntityType::File),
            "class" => Ok(EntityType::Class),
            "function" => Ok(EntityType::Function),
            "method" => Ok(EntityType::Method),
            "variable" => Ok(EntityType::Variable),
            "documentation" => Ok(EntityType::Documentation),
            "text_chunk" => Ok(EntityType::TextChunk),
            "manual_note" => Ok(EntityType::ManualNote),
            other => Ok(EntityType::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Imports,
    Inherits,
    Calls,
    Instantiates,
    Raises,
    Catches,
    Decorates,
    Reads,
    Writes,
    References,
    Contains,
    Other(String),
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationType::Imports => "imports",
            RelationType::Inherits => "inherits",
            RelationType::Calls => "calls",
            RelationType::Instantiates => "instantiates",
            RelationType::Raises => "raises",
            RelationType::Catches => "catches",
            RelationType::Decorates => "decorates",
            RelationType::Reads => "reads",
            RelationType::Writes => "writes",
            RelationType::References => "references",
            RelationType::Contains => "contains",
            RelationType::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "imports" => Ok(RelationType::Imports),
            "inherits" => Ok(RelationType::Inherits),
            "calls" => Ok(RelationType::Calls),
            "instantiates" => Ok(RelationType::Instantiates),
            "raises" => Ok(RelationType::Raises),
            "catches" => Ok(RelationType::Catches),
            "decorates" => Ok(RelationType::Decorates),
            "reads" => Ok(RelationType::Reads),
            "writes" => Ok(RelationType::Writes),
            "references" => Ok(RelationType::References),
            "contains" => Ok(RelationType::Contains),
            other => Ok(RelationType::Other(other.to_string())),
        }
    }
}

/// The two halves of progressive disclosure: compact metadata for fast
/// search, full implementation fetched on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Metadata,
    Implementation,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Metadata => write!(f, "metadata"),
            ChunkKind::Implementation => write!(f, "implementation"),
        }
    }
}

/// Inclusive 1-indexed line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(line: u32) -> Self {
        Self {
            start: line,
            end: line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_display_roundtrip() {
        for ty in [
            EntityType::File,
            EntityType::Class,
            EntityType::Function,
            EntityType::Method,
            EntityType::Variable,
            EntityType::Documentation,
            EntityType::TextChunk,
            EntityType::ManualNote,
        ] {
            let parsed: EntityType = ty.to_string().parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn relation_type_unknown_maps_to_other() {
        let parsed: RelationType = "monkeypatches".parse().unwrap();
        assert_eq!(parsed, RelationType::Other("monkeypatches".to_string()));
    }
}
