use serde::{Deserialize, Deserializer, Serialize};

/// A position in embedding (data) space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Anything that can be placed on the map. `None` means the record has no usable
/// 2-D position and must be dropped before it reaches the engine.
pub trait Spatial {
    fn position(&self) -> Option<Point>;
}

fn point_from_coords(coords: &[f64]) -> Option<Point> {
    match coords {
        [x, y, ..] if x.is_finite() && y.is_finite() => Some(Point::new(*x, *y)),
        _ => None,
    }
}

/// An evaluation question as delivered by the data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_coords")]
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metrics: serde_json::Value,
}

impl Question {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self {
            id,
            embedding: vec![x, y],
            question: None,
            text: None,
            answer: None,
            kind: None,
            metrics: serde_json::Value::Null,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Text shown for the question; `text` wins over `question`.
    pub fn display_text(&self) -> String {
        self.text
            .as_deref()
            .or(self.question.as_deref())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Question {}", self.id))
    }
}

impl Spatial for Question {
    fn position(&self) -> Option<Point> {
        point_from_coords(&self.embedding)
    }
}

/// A supporting document chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_coords")]
    pub vector: Vec<f64>,
    #[serde(default)]
    pub text: String,
}

impl Chunk {
    pub fn new(x: f64, y: f64, text: impl Into<String>) -> Self {
        Self {
            id: None,
            vector: vec![x, y],
            text: text.into(),
        }
    }
}

impl Spatial for Chunk {
    fn position(&self) -> Option<Point> {
        point_from_coords(&self.vector)
    }
}

/// Coordinates arrive as loosely-typed JSON. Anything that is not a number or a
/// numeric string becomes NaN so the validity filter can drop the record.
fn lenient_coords<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .iter()
        .map(|value| match value {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            _ => f64::NAN,
        })
        .collect())
}

fn lenient_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    })
}

/// Questions with a valid 2-D position, in input order.
pub fn valid_questions(questions: &[Question]) -> Vec<Question> {
    questions
        .iter()
        .filter(|q| q.position().is_some())
        .cloned()
        .collect()
}

/// Chunks with a valid 2-D position, truncated to the first `limit`.
pub fn valid_chunks(chunks: &[Chunk], limit: usize) -> Vec<Chunk> {
    chunks
        .iter()
        .filter(|c| c.position().is_some())
        .take(limit)
        .cloned()
        .collect()
}

/// One complete data snapshot handed over by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl Snapshot {
    pub fn new(questions: Vec<Question>, chunks: Vec<Chunk>) -> Self {
        let mut snapshot = Self { questions, chunks };
        snapshot.assign_missing_ids();
        snapshot
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let parsed: Self =
            serde_json::from_str(raw).map_err(|e| format!("snapshot parse error: {e}"))?;
        Ok(Self::new(parsed.questions, parsed.chunks))
    }

    pub fn questions_from_json(raw: &str) -> Result<Vec<Question>, String> {
        serde_json::from_str(raw).map_err(|e| format!("questions parse error: {e}"))
    }

    pub fn chunks_from_json(raw: &str) -> Result<Vec<Chunk>, String> {
        serde_json::from_str(raw).map_err(|e| format!("chunks parse error: {e}"))
    }

    /// Questions without an id get their 1-based position.
    fn assign_missing_ids(&mut self) {
        for (index, question) in self.questions.iter_mut().enumerate() {
            if question.id == 0 {
                question.id = index as u64 + 1;
            }
        }
    }
}

/// Fingerprint of the renderable content of a snapshot: valid positions, ids
/// and the texts shown in tooltips and the cell panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataVersion(pub u32);

impl DataVersion {
    pub fn of(questions: &[Question], chunks: &[Chunk]) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        for question in questions {
            if let Some(p) = question.position() {
                hasher.update(&question.id.to_le_bytes());
                hasher.update(&p.x.to_bits().to_le_bytes());
                hasher.update(&p.y.to_bits().to_le_bytes());
                hash_text(&mut hasher, &question.display_text());
                hash_text(&mut hasher, question.answer.as_deref().unwrap_or_default());
            }
        }
        hasher.update(b"|");
        for chunk in chunks {
            if let Some(p) = chunk.position() {
                hasher.update(&p.x.to_bits().to_le_bytes());
                hasher.update(&p.y.to_bits().to_le_bytes());
                hash_text(&mut hasher, chunk.id.as_deref().unwrap_or_default());
                hash_text(&mut hasher, &chunk.text);
            }
        }
        Self(hasher.finalize())
    }
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn hash_text(hasher: &mut crc32fast::Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}
