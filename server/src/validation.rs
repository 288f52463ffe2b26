use dub_core::ChunkRecord;

use crate::error::ApiError;

/// Maximum text length of a single chunk
const MAX_CHUNK_TEXT_LENGTH: usize = 5000;
/// Maximum number of chunks per request
const MAX_CHUNKS: usize = 10_000;
const MAX_JOB_ID_LENGTH: usize = 64;

/// Validate a chunk list before it reaches the engine.
///
/// Blank texts are allowed (they become silence); timestamps are checked by
/// the engine itself so its errors carry the chunk index.
pub fn validate_chunks(chunks: &[ChunkRecord]) -> Result<(), ApiError> {
    if chunks.is_empty() {
        return Err(ApiError::InvalidInput("Chunk list cannot be empty".to_string()));
    }
    if chunks.len() > MAX_CHUNKS {
        return Err(ApiError::InvalidInput(format!(
            "Too many chunks (max {})",
            MAX_CHUNKS
        )));
    }
    if chunks.iter().all(|c| c.text.trim().is_empty()) {
        return Err(ApiError::InvalidInput("All chunk texts are empty".to_string()));
    }
    if let Some((i, _)) = chunks
        .iter()
        .enumerate()
        .find(|(_, c)| c.text.len() > MAX_CHUNK_TEXT_LENGTH)
    {
        return Err(ApiError::InvalidInput(format!(
            "Text of chunk {} too long (max {} characters)",
            i, MAX_CHUNK_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a dub request
pub fn validate_dub_request(
    chunks: &[ChunkRecord],
    language: &str,
    job_id: Option<&str>,
) -> Result<(), ApiError> {
    validate_chunks(chunks)?;

    if !is_valid_language_code(language) {
        return Err(ApiError::InvalidInput(format!(
            "Invalid language code format: {}. Expected format: ll_CC (e.g., en_US, pt_BR)",
            language
        )));
    }

    if let Some(id) = job_id {
        validate_job_id(id)?;
    }
    Ok(())
}

/// Job ids name a directory under the clip cache root.
pub fn validate_job_id(id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_JOB_ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::InvalidInput(format!(
            "Invalid job id: {id:?}. Use up to {MAX_JOB_ID_LENGTH} letters, digits, '-' or '_'"
        )));
    }
    Ok(())
}

/// Validate language code format (e.g., en_US, pt_BR)
fn is_valid_language_code(code: &str) -> bool {
    // ll_CC (2 lowercase letters, underscore, 2 uppercase letters) or just ll
    let parts: Vec<&str> = code.split('_').collect();
    match parts.len() {
        1 => parts[0].len() == 2 && parts[0].chars().all(|c| c.is_ascii_lowercase()),
        2 => {
            parts[0].len() == 2
                && parts[0].chars().all(|c| c.is_ascii_lowercase())
                && parts[1].len() == 2
                && parts[1].chars().all(|c| c.is_ascii_uppercase())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: f64, end: f64, text: &str) -> ChunkRecord {
        ChunkRecord {
            timestamp: (start, Some(end)),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_validate_dub_request_valid() {
        let chunks = vec![record(0.0, 1.0, "Olá"), record(1.0, 2.0, "")];
        assert!(validate_dub_request(&chunks, "en_US", None).is_ok());
        assert!(validate_dub_request(&chunks, "en", Some("job-42_a")).is_ok());
    }

    #[test]
    fn test_validate_empty_chunks() {
        let result = validate_chunks(&[]);
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("empty"));
        } else {
            panic!("expected invalid input");
        }

        let result = validate_chunks(&[record(0.0, 1.0, "  ")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_chunk_too_long() {
        let long_text = "a".repeat(6000);
        let result = validate_chunks(&[record(0.0, 1.0, "ok"), record(1.0, 2.0, &long_text)]);
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("chunk 1"));
            assert!(msg.contains("too long"));
        } else {
            panic!("expected invalid input");
        }
    }

    #[test]
    fn test_validate_invalid_language_code() {
        let chunks = vec![record(0.0, 1.0, "Olá")];
        assert!(validate_dub_request(&chunks, "invalid", None).is_err());
        assert!(validate_dub_request(&chunks, "EN", None).is_err());
        assert!(validate_dub_request(&chunks, "en_us", None).is_err());
        assert!(validate_dub_request(&chunks, "pt_BR", None).is_ok());
    }

    #[test]
    fn test_validate_job_id() {
        assert!(validate_job_id("abc-123").is_ok());
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id(&"x".repeat(65)).is_err());
    }
}
