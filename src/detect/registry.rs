use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::Annotator;
use super::backends::{MotionAnnotator, StubAnnotator};

/// Thread-safe registry of annotators.
///
/// Annotators are wrapped in `Mutex` because `Annotator::annotate` takes `&mut self`.
pub struct AnnotatorRegistry {
    annotators: HashMap<String, Arc<Mutex<dyn Annotator>>>,
    default_name: Option<String>,
}

impl AnnotatorRegistry {
    pub fn new() -> Self {
        Self {
            annotators: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry holding the built-in annotators, `motion` first.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MotionAnnotator::default());
        registry.register(StubAnnotator);
        registry
    }

    /// Register an annotator. The first registered annotator becomes the default.
    pub fn register<A: Annotator + 'static>(&mut self, annotator: A) {
        let name = annotator.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.annotators.insert(name, Arc::new(Mutex::new(annotator)));
    }

    /// Set default annotator by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.annotators.contains_key(name) {
            return Err(anyhow!("annotator '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get annotator by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn Annotator>>> {
        self.annotators.get(name).cloned()
    }

    /// Get default annotator.
    pub fn default_annotator(&self) -> Option<Arc<Mutex<dyn Annotator>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered annotator names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.annotators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up `name`, listing the alternatives when it is unknown.
    pub fn select(&self, name: &str) -> Result<Arc<Mutex<dyn Annotator>>> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "annotator '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })
    }
}

impl Default for AnnotatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
