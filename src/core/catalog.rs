//! Scenario exercise catalog
//!
//! Exercises are immutable once loaded. The built-in set is embedded at build
//! time; a TOML file with the same layout can replace it.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
    /// Marks the expected answer when the exercise is scored.
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub choices: Vec<Choice>,
}

impl Exercise {
    pub fn choice(&self, id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }

    pub fn correct_choice(&self) -> Option<&Choice> {
        self.choices.iter().find(|c| c.correct)
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "failed to read exercise catalog: {err}"),
            CatalogError::Parse(err) => write!(f, "failed to parse exercise catalog: {err}"),
            CatalogError::Invalid(reason) => write!(f, "invalid exercise catalog: {reason}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogError::Io(err) => Some(err),
            CatalogError::Parse(err) => Some(err),
            CatalogError::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseCatalog {
    exercises: Vec<Exercise>,
}

impl ExerciseCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        const CATALOG_CONTENT: &str = include_str!("../builtin_exercises.toml");
        Self::from_toml(CATALOG_CONTENT)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(CatalogError::Io)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, CatalogError> {
        let catalog: ExerciseCatalog = toml::from_str(contents).map_err(CatalogError::Parse)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = HashSet::new();
        for exercise in &self.exercises {
            if !ids.insert(exercise.id.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate exercise id '{}'",
                    exercise.id
                )));
            }
            if exercise.choices.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "exercise '{}' has no choices",
                    exercise.id
                )));
            }
            let mut choice_ids = HashSet::new();
            for choice in &exercise.choices {
                if !choice_ids.insert(choice.id.as_str()) {
                    return Err(CatalogError::Invalid(format!(
                        "exercise '{}' repeats choice id '{}'",
                        exercise.id, choice.id
                    )));
                }
            }
            if exercise.choices.iter().filter(|c| c.correct).count() > 1 {
                return Err(CatalogError::Invalid(format!(
                    "exercise '{}' marks more than one choice as correct",
                    exercise.id
                )));
            }
        }
        Ok(())
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn get(&self, id: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.exercises
            .iter()
            .map(|e| e.category.as_str())
            .filter(|category| seen.insert(*category))
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&Exercise> {
        self.exercises
            .iter()
            .filter(|e| e.category.eq_ignore_ascii_case(category))
            .collect()
    }
}
