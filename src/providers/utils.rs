use anyhow::{anyhow, Result};
use reqwest::Response;
use serde_json::Value;

pub fn ensure_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(anyhow!("Prompt must be a non-empty string"));
    }
    Ok(())
}

/// Reads a JSON body, turning non-2xx statuses and `{"error": ...}` bodies
/// into errors that carry what the server said.
pub async fn json_or_error(response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(anyhow!("API request failed: Status {}, Body: {}", status, error_text));
    }

    let body: Value = response.json().await?;
    if let Some(error) = body.get("error") {
        return Err(anyhow!("API returned error: {}", error));
    }
    Ok(body)
}

/// Extracts `choices[0].message.content` from an OpenAI-compatible reply.
pub fn chat_content(body: &Value) -> Result<String> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let debug_json = serde_json::to_string_pretty(body).unwrap_or_default();
            anyhow!("Invalid response format. Response JSON: {}", debug_json)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_prompt_is_rejected() {
        assert!(ensure_prompt("   \n").is_err());
        assert!(ensure_prompt("What is the grading scale?").is_ok());
    }

    #[test]
    fn test_chat_content_extraction() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Grades go from A to F."}}]});
        assert_eq!(chat_content(&body).unwrap(), "Grades go from A to F.");
        assert!(chat_content(&json!({"choices": []})).is_err());
    }
}
