use std::collections::BTreeMap;

use thiserror::Error;

use crate::segmentation::{LabelId, ThresholdRule, UNLABELED};

#[derive(Debug, Error, PartialEq)]
pub enum StyleError {
    #[error("No style defined for label {label}")]
    MissingStyle { label: LabelId },

    #[error("Invalid style for label {label}: {reason}")]
    InvalidStyle { label: LabelId, reason: String },
}

/// How one label is drawn over the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
    pub label: LabelId,
    pub color: [u8; 3],
    /// `0.0..=1.0`
    pub opacity: f32,
    pub outline: bool,
    /// Outline width in pixels, at least 1.
    pub outline_thickness: u32,
}

impl LabelStyle {
    pub fn new(label: LabelId, color: [u8; 3], opacity: f32) -> Self {
        Self {
            label,
            color,
            opacity,
            outline: false,
            outline_thickness: 1,
        }
    }

    pub fn with_outline(mut self, thickness: u32) -> Self {
        self.outline = true;
        self.outline_thickness = thickness;
        self
    }

    fn validate(&self) -> Result<(), StyleError> {
        let invalid = |reason: &str| StyleError::InvalidStyle {
            label: self.label,
            reason: reason.to_owned(),
        };
        if self.label == UNLABELED {
            return Err(invalid("label 0 is the unstyled background"));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(invalid("opacity must lie in [0, 1]"));
        }
        if self.outline_thickness == 0 {
            return Err(invalid("outline thickness must be a positive integer"));
        }
        Ok(())
    }
}

/// Immutable label → style mapping, checked against the rules it will draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelStyleTable {
    styles: BTreeMap<LabelId, LabelStyle>,
}

impl LabelStyleTable {
    /// # Errors
    ///
    /// [`StyleError::InvalidStyle`] for out-of-range opacity, zero outline
    /// thickness, a style for label 0 or two styles for one label;
    /// [`StyleError::MissingStyle`] when a rule produces a label without a
    /// style.
    pub fn new(
        styles: impl IntoIterator<Item = LabelStyle>,
        rules: &[ThresholdRule],
    ) -> Result<Self, StyleError> {
        let mut table = BTreeMap::new();
        for style in styles {
            style.validate()?;
            if table.insert(style.label, style).is_some() {
                return Err(StyleError::InvalidStyle {
                    label: style.label,
                    reason: "defined more than once".to_owned(),
                });
            }
        }

        if let Some(rule) = rules
            .iter()
            .find(|rule| rule.label != UNLABELED && !table.contains_key(&rule.label))
        {
            return Err(StyleError::MissingStyle { label: rule.label });
        }

        Ok(Self { styles: table })
    }

    /// Style for `label`; always `None` for label 0.
    pub fn get(&self, label: LabelId) -> Option<&LabelStyle> {
        self.styles.get(&label)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelStyle> {
        self.styles.values()
    }
}
