use ragmap_shared::{OverviewConfig, Question, Snapshot};

pub const QUESTIONS_URL: &str = "/data/questions.json";
pub const CHUNKS_URL: &str = "/data/chunks.json";
pub const CONFIG_URL: &str = "/overview.config.json";

async fn fetch_text(url: &str) -> Result<String, String> {
    let resp = gloo_net::http::Request::get(url)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;
    if !resp.ok() {
        return Err(format!("HTTP {} for {url}", resp.status()));
    }
    resp.text().await.map_err(|e| format!("read error: {e}"))
}

/// Fetch questions and chunks and assemble one snapshot.
pub async fn fetch_snapshot() -> Result<Snapshot, String> {
    let questions = Snapshot::questions_from_json(&fetch_text(QUESTIONS_URL).await?)?;
    let chunks = Snapshot::chunks_from_json(&fetch_text(CHUNKS_URL).await?)?;
    Ok(Snapshot::new(questions, chunks))
}

/// Optional tuning file. Missing or malformed falls back to defaults.
pub async fn fetch_config() -> OverviewConfig {
    match fetch_text(CONFIG_URL).await {
        Ok(raw) => OverviewConfig::from_json(&raw).unwrap_or_else(|e| {
            web_sys::console::warn_1(&format!("{e}, using defaults").into());
            OverviewConfig::default()
        }),
        Err(e) => {
            web_sys::console::info_1(&format!("no overview config ({e}), using defaults").into());
            OverviewConfig::default()
        }
    }
}

/// Ids of questions whose display text contains `query` (case-insensitive).
/// An empty query keeps everything.
pub fn filter_visible(questions: &[Question], query: &str) -> Vec<u64> {
    let needle = query.trim().to_lowercase();
    questions
        .iter()
        .filter(|q| needle.is_empty() || q.display_text().to_lowercase().contains(&needle))
        .map(|q| q.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_keeps_all() {
        let questions = vec![Question::new(1, 0.0, 0.0), Question::new(2, 1.0, 1.0)];
        assert_eq!(filter_visible(&questions, "  "), vec![1, 2]);
    }

    #[test]
    fn query_matches_display_text() {
        let questions = vec![
            Question::new(1, 0.0, 0.0).with_text("How do tides work?"),
            Question::new(2, 1.0, 1.0).with_text("What is entropy?"),
        ];
        assert_eq!(filter_visible(&questions, "TIDES"), vec![1]);
        assert!(filter_visible(&questions, "gravity").is_empty());
    }
}
