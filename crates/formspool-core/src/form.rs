//! Fully decoded forms.

use crate::part::{DecodedPart, SpooledFile};

/// Every part of a successfully decoded form, in stream order.
///
/// Spooled files still owned by the form are removed when it is dropped.
#[derive(Debug, Default)]
pub struct UploadForm {
    parts: Vec<DecodedPart>,
}

impl UploadForm {
    /// Create an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from decoded parts.
    #[must_use]
    pub fn from_parts(parts: Vec<DecodedPart>) -> Self {
        Self { parts }
    }

    /// All parts.
    #[must_use]
    pub fn parts(&self) -> &[DecodedPart] {
        &self.parts
    }

    /// Consume the form and return its parts.
    #[must_use]
    pub fn into_parts(self) -> Vec<DecodedPart> {
        self.parts
    }

    /// First text field named `name`.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.is_field() && p.name() == name)
            .and_then(DecodedPart::text)
    }

    /// All text fields as `(name, value)` pairs. Fields that are not UTF-8
    /// are skipped.
    #[must_use]
    pub fn fields(&self) -> Vec<(&str, &str)> {
        self.parts
            .iter()
            .filter_map(|p| Some((p.name(), p.text()?)))
            .collect()
    }

    /// First file part named `name`.
    #[must_use]
    pub fn get_file(&self, name: &str) -> Option<&SpooledFile> {
        self.parts
            .iter()
            .filter(|p| p.name() == name)
            .find_map(DecodedPart::as_file)
    }

    /// Every file part named `name` (for multiple uploads under one field).
    #[must_use]
    pub fn get_files(&self, name: &str) -> Vec<&SpooledFile> {
        self.parts
            .iter()
            .filter(|p| p.name() == name)
            .filter_map(DecodedPart::as_file)
            .collect()
    }

    /// Remove the first file part named `name` and return its file.
    pub fn take_file(&mut self, name: &str) -> Option<SpooledFile> {
        let index = self
            .parts
            .iter()
            .position(|p| p.is_file() && p.name() == name)?;
        self.parts.remove(index).into_file()
    }

    /// Consume the form and return every spooled file.
    #[must_use]
    pub fn into_files(self) -> Vec<SpooledFile> {
        self.parts
            .into_iter()
            .filter_map(DecodedPart::into_file)
            .collect()
    }

    /// Returns true if any part is named `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.name() == name)
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the form has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl IntoIterator for UploadForm {
    type Item = DecodedPart;
    type IntoIter = std::vec::IntoIter<DecodedPart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}
