//! Input validation utilities for Spindle Core
//!
//! Validation runs before any engine resource is committed, so every check
//! here reports a coded [`CoreError`] with a suggestion for the user.

use crate::{codes, CoreError, Result};
use std::path::{Path, PathBuf};

/// Largest `max_length` accepted before it is considered a mistake
pub const MAX_LENGTH_LIMIT: usize = 1_048_576;

/// Validation utilities for common operations
pub struct Validator;

impl Validator {
    /// Validate a model directory path
    pub fn validate_model_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();

        if !path.exists() {
            return Err(CoreError::model_with_path(
                "MODEL_DIR_NOT_FOUND",
                format!("Model directory does not exist: {}", path.display()),
                format!("Attempted to load model from: {}", path.display()),
                "Check the path is correct and the model directory exists",
                path_buf,
            ));
        }

        if !path.is_dir() {
            return Err(CoreError::model_with_path(
                "MODEL_PATH_NOT_DIR",
                format!("Model path is not a directory: {}", path.display()),
                "A model is a directory holding genai_config.json, tokenizer.json and weights",
                "Point to the directory that contains genai_config.json",
                path_buf,
            ));
        }

        Ok(path_buf)
    }

    /// Validate that a required model artifact exists inside the model directory
    pub fn validate_model_artifact(dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        if !path.is_file() {
            return Err(CoreError::model_with_path(
                "MODEL_ARTIFACT_MISSING",
                format!("Missing model artifact: {}", file_name),
                format!("Model directory: {}", dir.display()),
                format!("Make sure {} is present in the model directory", file_name),
                path,
            ));
        }
        Ok(path)
    }

    /// Validate generation parameters
    pub fn validate_generation_config(
        max_length: Option<usize>,
        batch_size: Option<usize>,
        temperature: Option<f32>,
        top_p: Option<f32>,
        top_k: Option<usize>,
        repetition_penalty: Option<f32>,
    ) -> Result<()> {
        if let Some(max_length) = max_length {
            if max_length == 0 {
                return Err(CoreError::invalid_parameter(
                    "INVALID_MAX_LENGTH",
                    "max_length cannot be zero",
                    "Generation parameter validation",
                    "Use a value larger than the prompt length",
                    "max_length",
                    "0",
                    format!("1 to {}", MAX_LENGTH_LIMIT),
                ));
            }
            if max_length > MAX_LENGTH_LIMIT {
                return Err(CoreError::invalid_parameter(
                    "MAX_LENGTH_TOO_LARGE",
                    "max_length is unreasonably large",
                    "Generation parameter validation",
                    "Use a value within the model context length",
                    "max_length",
                    max_length.to_string(),
                    format!("1 to {}", MAX_LENGTH_LIMIT),
                ));
            }
        }

        if let Some(batch_size) = batch_size {
            if batch_size != 1 {
                return Err(CoreError::invalid_parameter(
                    "BATCH_SIZE_UNSUPPORTED",
                    format!("batch_size {} is not supported", batch_size),
                    "Generation parameter validation",
                    "Streaming sessions generate a single sequence; use batch_size = 1",
                    "batch_size",
                    batch_size.to_string(),
                    "1",
                ));
            }
        }

        if let Some(temperature) = temperature {
            if !(temperature >= 0.0) {
                return Err(CoreError::invalid_parameter(
                    "TEMPERATURE_NEGATIVE",
                    "Temperature cannot be negative",
                    "Generation parameter validation",
                    "Use 0.0 for deterministic output or positive values for randomness",
                    "temperature",
                    temperature.to_string(),
                    "0.0 to 2.0 (typical range)",
                ));
            }
            if temperature > 10.0 {
                return Err(CoreError::invalid_parameter(
                    "TEMPERATURE_TOO_HIGH",
                    "Temperature is unreasonably high",
                    "Generation parameter validation",
                    "Use values between 0.0 and 2.0 for reasonable generation quality",
                    "temperature",
                    temperature.to_string(),
                    "0.0 to 2.0 (typical range)",
                ));
            }
        }

        if let Some(top_p) = top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(CoreError::invalid_parameter(
                    "TOP_P_OUT_OF_RANGE",
                    "top_p must be between 0.0 and 1.0",
                    "Generation parameter validation",
                    "Use values between 0.0 and 1.0 for nucleus sampling",
                    "top_p",
                    top_p.to_string(),
                    "0.0 (exclusive) to 1.0",
                ));
            }
        }

        if let Some(top_k) = top_k {
            if top_k == 0 {
                return Err(CoreError::invalid_parameter(
                    "TOP_K_ZERO",
                    "top_k cannot be zero",
                    "Generation parameter validation",
                    "Use a positive value; larger than the vocabulary disables the filter",
                    "top_k",
                    "0",
                    "1 to 100 (typical range)",
                ));
            }
        }

        if let Some(repetition_penalty) = repetition_penalty {
            if !(repetition_penalty > 0.0) {
                return Err(CoreError::invalid_parameter(
                    "REPETITION_PENALTY_INVALID",
                    "Repetition penalty must be positive",
                    "Generation parameter validation",
                    "Use values > 1.0 to penalize repetition, < 1.0 to encourage it",
                    "repetition_penalty",
                    repetition_penalty.to_string(),
                    "0.1 to 2.0 (typical range)",
                ));
            }
            if repetition_penalty > 10.0 {
                return Err(CoreError::invalid_parameter(
                    "REPETITION_PENALTY_TOO_HIGH",
                    "Repetition penalty is unreasonably high",
                    "Generation parameter validation",
                    "Use values between 1.0 and 2.0 for reasonable quality",
                    "repetition_penalty",
                    repetition_penalty.to_string(),
                    "0.1 to 2.0 (typical range)",
                ));
            }
        }

        Ok(())
    }

    /// Validate input text; empty or whitespace-only text is rejected
    pub fn validate_input_text(text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(CoreError::invalid_input(
                codes::INPUT_TEXT_EMPTY,
                "Input cannot be empty",
                "Text input validation",
                "Provide some text for the model to respond to",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_validate_model_dir_not_found() {
        let err = Validator::validate_model_dir("/nonexistent/model-dir").unwrap_err();
        assert_eq!(err.code(), "MODEL_DIR_NOT_FOUND");
        assert_eq!(err.kind(), crate::ErrorKind::ModelLoad);
    }

    #[test]
    fn test_validate_model_dir_rejects_file() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("model.onnx");
        File::create(&file_path).unwrap();

        let err = Validator::validate_model_dir(&file_path).unwrap_err();
        assert_eq!(err.code(), "MODEL_PATH_NOT_DIR");
        assert!(Validator::validate_model_dir(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_validate_model_artifact_missing() {
        let temp_dir = tempdir().unwrap();
        let err = Validator::validate_model_artifact(temp_dir.path(), "tokenizer.json").unwrap_err();
        assert_eq!(err.code(), "MODEL_ARTIFACT_MISSING");
        assert!(err.to_string().contains("tokenizer.json"));
    }

    #[test]
    fn test_validate_generation_config_invalid_temperature() {
        let err = Validator::validate_generation_config(
            Some(100),
            Some(1),
            Some(-1.0),
            Some(0.9),
            Some(50),
            Some(1.1),
        )
        .unwrap_err();
        assert_eq!(err.code(), "TEMPERATURE_NEGATIVE");
    }

    #[test]
    fn test_validate_generation_config_rejects_nan() {
        let err = Validator::validate_generation_config(None, None, None, Some(f32::NAN), None, None)
            .unwrap_err();
        assert_eq!(err.code(), "TOP_P_OUT_OF_RANGE");
    }

    #[test]
    fn test_validate_generation_config_valid() {
        let result = Validator::validate_generation_config(
            Some(2048),
            Some(1),
            Some(1.0),
            Some(0.9),
            Some(50),
            Some(1.0),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_input_text_empty() {
        for text in ["", "   ", "\n\t"] {
            let err = Validator::validate_input_text(text).unwrap_err();
            assert_eq!(err.code(), codes::INPUT_TEXT_EMPTY);
            assert_eq!(err.kind(), crate::ErrorKind::EmptyInput);
        }
    }
}
