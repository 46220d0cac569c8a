use crate::messages::PredictionResult;
use std::fmt;

/// Shown in place of the confidence for unknown classifications.
pub const CONFIDENCE_PLACEHOLDER: &str = "--";

/// Shown when a diagnosis carries no treatment advice.
pub const NO_TREATMENT_TEXT: &str = "No treatment info.";

/// Shown when the backend omits the label.
pub const MISSING_LABEL_TEXT: &str = "Unknown";

pub const SCHEMES_HEADING: &str = "Government Schemes:";

const UNKNOWN_MARKER: &str = "unknown";

/// The result fields as they are displayed to the user.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultView {
    pub disease_name: String,
    pub confidence: String,
    pub treatment: String,
    pub message: Option<String>,
    pub schemes: Vec<String>,
}

impl ResultView {
    pub fn from_prediction(result: &PredictionResult) -> Self {
        let disease_name = result
            .label
            .as_deref()
            .filter(|label| !label.is_empty())
            .unwrap_or(MISSING_LABEL_TEXT)
            .to_string();

        if is_unknown_label(&disease_name) {
            return Self {
                disease_name,
                confidence: CONFIDENCE_PLACEHOLDER.to_string(),
                treatment: String::new(),
                message: result.message.clone().filter(|m| !m.is_empty()),
                schemes: Vec::new(),
            };
        }

        Self {
            disease_name,
            confidence: result
                .confidence
                .map(format_confidence)
                .unwrap_or_else(|| CONFIDENCE_PLACEHOLDER.to_string()),
            treatment: result
                .treatment
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| NO_TREATMENT_TEXT.to_string()),
            message: None,
            schemes: result.scheme_items().to_vec(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        is_unknown_label(&self.disease_name)
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Disease: {}", self.disease_name)?;
        writeln!(f, "Confidence: {}", self.confidence)?;
        if !self.treatment.is_empty() {
            writeln!(f, "Treatment: {}", self.treatment)?;
        }
        if let Some(message) = &self.message {
            writeln!(f, "Note: {message}")?;
        }
        if !self.schemes.is_empty() {
            writeln!(f, "{SCHEMES_HEADING}")?;
            for scheme in &self.schemes {
                writeln!(f, "  - {scheme}")?;
            }
        }
        Ok(())
    }
}

/// Case-insensitive substring match on "unknown".
pub fn is_unknown_label(label: &str) -> bool {
    label.to_lowercase().contains(UNKNOWN_MARKER)
}

/// Formats a fractional confidence as a percentage with two decimals.
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.2}%", confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> PredictionResult {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn renders_late_blight_diagnosis() {
        let view = ResultView::from_prediction(&parse(
            r#"{"label":"Late Blight","confidence":0.8734,"treatment":"Apply fungicide","schemes":["Scheme A"]}"#,
        ));

        assert_eq!(view.disease_name, "Late Blight");
        assert_eq!(view.confidence, "87.34%");
        assert_eq!(view.treatment, "Apply fungicide");
        assert_eq!(view.schemes, vec!["Scheme A".to_string()]);
        assert!(!view.is_unknown());
    }

    #[test]
    fn renders_unknown_image_with_advisory() {
        let view = ResultView::from_prediction(&parse(
            r#"{"label":"Unknown Image","message":"Please submit a leaf photo"}"#,
        ));

        assert_eq!(view.confidence, CONFIDENCE_PLACEHOLDER);
        assert!(view.treatment.is_empty());
        assert_eq!(view.message.as_deref(), Some("Please submit a leaf photo"));
        assert!(view.schemes.is_empty());
    }

    #[test]
    fn unknown_match_ignores_case_and_other_fields() {
        let view = ResultView::from_prediction(&parse(
            r#"{"label":"probably UNKNOWN leaf","confidence":0.99,"treatment":"x","schemes":["y"]}"#,
        ));

        assert!(view.is_unknown());
        assert_eq!(view.confidence, "--");
        assert!(view.treatment.is_empty());
        assert!(view.schemes.is_empty());
        assert_eq!(view.message, None);
    }

    #[test]
    fn missing_treatment_uses_fallback_text() {
        let view = ResultView::from_prediction(&parse(r#"{"label":"Brown Spot","confidence":0.7}"#));
        assert_eq!(view.treatment, NO_TREATMENT_TEXT);
        assert_eq!(view.confidence, "70.00%");
    }

    #[test]
    fn missing_label_is_treated_as_unknown() {
        let view = ResultView::from_prediction(&parse(r#"{"confidence":0.5}"#));
        assert_eq!(view.disease_name, MISSING_LABEL_TEXT);
        assert_eq!(view.confidence, CONFIDENCE_PLACEHOLDER);
    }

    #[test]
    fn confidence_always_has_two_decimals() {
        for (confidence, expected) in [(0.0, "0.00%"), (1.0, "100.00%"), (0.256, "25.60%"), (0.6, "60.00%")] {
            assert_eq!(format_confidence(confidence), expected);
        }
    }

    #[test]
    fn display_omits_schemes_heading_when_empty() {
        let view = ResultView::from_prediction(&parse(
            r#"{"label":"Healthy Rice Leaf","confidence":0.95,"treatment":"None needed","govt_schemes":[]}"#,
        ));
        let text = view.to_string();
        assert!(!text.contains(SCHEMES_HEADING));
        assert!(text.contains("Confidence: 95.00%"));
    }

    #[test]
    fn display_lists_schemes_under_heading() {
        let view = ResultView::from_prediction(&parse(
            r#"{"label":"Sheath Blight","confidence":0.81,"govt_schemes":["PMFBY","Soil Health Card"]}"#,
        ));
        let text = view.to_string();
        assert!(text.contains("Government Schemes:\n  - PMFBY\n  - Soil Health Card\n"));
    }
}
