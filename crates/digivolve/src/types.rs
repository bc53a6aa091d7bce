use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid strategy '{0}'. Accepted values: 'requirements', 'hatching', 'links'")]
pub struct StrategyParseError(String);

/// Life stage of an entity as written in the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// The earliest stage. These pages list hatching sources instead of
    /// evolution requirements.
    Infancy,
    Other(String),
}

impl Stage {
    /// Parses a stage cell. Blank cells mean no stage.
    pub fn parse(raw: &str) -> Option<Stage> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.to_lowercase().as_str() {
            "baby" | "baby i" | "baby 1" | "fresh" | "infancy" => Some(Stage::Infancy),
            _ => Some(Stage::Other(trimmed.to_string())),
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Infancy => write!(f, "Infancy"),
            Stage::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub stage: Option<Stage>,
}

impl Entity {
    pub fn new(name: impl Into<String>, stage: Option<Stage>) -> Self {
        Self {
            name: name.into(),
            stage,
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "{} ({})", self.name, stage),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One directed edge between two entities. `from` may be empty when the
/// page does not name a predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    pub from: String,
    pub to: String,
    pub requirements: Vec<String>,
}

impl EvolutionRecord {
    pub fn new(from: impl Into<String>, to: impl Into<String>, requirements: Vec<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            requirements,
        }
    }
}

impl Display for EvolutionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)?;
        if !self.requirements.is_empty() {
            write!(f, " [{}]", self.requirements.join(", "))?;
        }
        Ok(())
    }
}

/// Which page layout to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Column groups under the "evolution requirements" box.
    Requirements,
    /// Rows of the "can hatch from" table.
    Hatching,
    /// Links listed under the "Evolves from" and "Evolves to" headings.
    Links,
}

impl Strategy {
    pub fn for_stage(stage: Option<&Stage>) -> Strategy {
        match stage {
            Some(Stage::Infancy) => Strategy::Hatching,
            _ => Strategy::Requirements,
        }
    }
}

impl FromStr for Strategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requirements" => Ok(Strategy::Requirements),
            "hatching" => Ok(Strategy::Hatching),
            "links" => Ok(Strategy::Links),
            _ => Err(StrategyParseError(s.to_string())),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Requirements => write!(f, "requirements"),
            Strategy::Hatching => write!(f, "hatching"),
            Strategy::Links => write!(f, "links"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse() {
        assert_eq!(Stage::parse("Baby I"), Some(Stage::Infancy));
        assert_eq!(Stage::parse("  infancy "), Some(Stage::Infancy));
        assert_eq!(
            Stage::parse("Rookie"),
            Some(Stage::Other("Rookie".to_string()))
        );
        assert_eq!(Stage::parse("   "), None);
    }

    #[test]
    fn test_strategy_for_stage() {
        assert_eq!(
            Strategy::for_stage(Some(&Stage::Infancy)),
            Strategy::Hatching
        );
        assert_eq!(
            Strategy::for_stage(Some(&Stage::Other("Champion".into()))),
            Strategy::Requirements
        );
        assert_eq!(Strategy::for_stage(None), Strategy::Requirements);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("links".parse::<Strategy>().unwrap(), Strategy::Links);
        assert!("columns".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_record_json_field_order() {
        let record = EvolutionRecord::new("Agumon", "Greymon", vec!["Level 15".into()]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"from":"Agumon","to":"Greymon","requirements":["Level 15"]}"#
        );
    }
}
