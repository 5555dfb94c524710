//! Wire messages exchanged with the decode service.
//!
//! Every message is one flat JSON object written on a fresh connection and
//! terminated by closing the write side. Array-valued request fields travel
//! as list strings (`"[1, 2, 3]"`), which is what the service splits on.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::app::types::{Candidate, CandidateList, TouchPoint};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("no decode endpoint configured")]
    NoEndpoint,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown task {0:?}")]
    UnknownTask(String),
    #[error("reply has {words} words but {scores} scores")]
    LengthMismatch { words: usize, scores: usize },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeTask {
    /// Free text entry.
    #[default]
    #[serde(rename = "DECODE")]
    Decode,
    /// Command vocabulary.
    #[serde(rename = "CMD_DECODE")]
    CmdDecode,
}

impl DecodeTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "DECODE",
            Self::CmdDecode => "CMD_DECODE",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeRequest {
    pub task: DecodeTask,
    pub points: Vec<TouchPoint>,
    pub prev_word: String,
    pub prev_text: String,
    /// Candidates the user rejected for this word; the service must not offer them again.
    pub banned_words: Vec<String>,
    /// Filled in by the client with the port its receive socket is bound to.
    pub reply_port: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolMessage {
    Decode(DecodeRequest),
    Confirm { word: String },
    Undo { banned_words: Vec<String> },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DecodeFields {
    xpoints: String,
    ypoints: String,
    timestamps: String,
    orientations: String,
    velocities: String,
    prev_text: String,
    prev_word: String,
    port: String,
    undo_words: String,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "TASK")]
enum WireMessage {
    #[serde(rename = "DECODE")]
    Decode(DecodeFields),
    #[serde(rename = "CMD_DECODE")]
    CmdDecode(DecodeFields),
    #[serde(rename = "CONFIRM")]
    Confirm {
        #[serde(rename = "CUR_WORD")]
        cur_word: String,
    },
    #[serde(rename = "UNDO")]
    Undo {
        #[serde(rename = "CUR_WORD")]
        cur_word: String,
    },
}

const TASKS: [&str; 4] = ["DECODE", "CMD_DECODE", "CONFIRM", "UNDO"];

impl ProtocolMessage {
    pub fn task(&self) -> &'static str {
        match self {
            Self::Decode(request) => request.task.as_str(),
            Self::Confirm { .. } => "CONFIRM",
            Self::Undo { .. } => "UNDO",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let wire = match self {
            Self::Decode(request) => {
                let fields = encode_fields(request);
                match request.task {
                    DecodeTask::Decode => WireMessage::Decode(fields),
                    DecodeTask::CmdDecode => WireMessage::CmdDecode(fields),
                }
            }
            Self::Confirm { word } => WireMessage::Confirm {
                cur_word: word.clone(),
            },
            Self::Undo { banned_words } => WireMessage::Undo {
                cur_word: list_string(banned_words),
            },
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Service-side parse of a request body.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let task = value
            .get("TASK")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing TASK".to_string()))?;
        if !TASKS.contains(&task) {
            return Err(ProtocolError::UnknownTask(task.to_string()));
        }

        Ok(match serde_json::from_value::<WireMessage>(value)? {
            WireMessage::Decode(fields) => Self::Decode(decode_fields(DecodeTask::Decode, fields)?),
            WireMessage::CmdDecode(fields) => {
                Self::Decode(decode_fields(DecodeTask::CmdDecode, fields)?)
            }
            WireMessage::Confirm { cur_word } => Self::Confirm { word: cur_word },
            WireMessage::Undo { cur_word } => Self::Undo {
                banned_words: parse_list(&cur_word),
            },
        })
    }
}

fn encode_fields(request: &DecodeRequest) -> DecodeFields {
    let points = &request.points;
    DecodeFields {
        xpoints: list_string(points.iter().map(|p| p.x as i32)),
        ypoints: list_string(points.iter().map(|p| p.y as i32)),
        timestamps: list_string(points.iter().map(|p| p.t_ms)),
        orientations: float_list_string(points.iter().map(|p| p.orientation_rad)),
        velocities: float_list_string(points.iter().map(|p| p.velocity)),
        prev_text: request.prev_text.clone(),
        prev_word: request.prev_word.clone(),
        port: request.reply_port.to_string(),
        undo_words: list_string(&request.banned_words),
    }
}

fn decode_fields(task: DecodeTask, fields: DecodeFields) -> Result<DecodeRequest, ProtocolError> {
    let xs: Vec<f32> = parse_numbers(&fields.xpoints, "XPOINTS")?;
    let ys: Vec<f32> = parse_numbers(&fields.ypoints, "YPOINTS")?;
    let ts: Vec<i64> = parse_numbers(&fields.timestamps, "TIMESTAMPS")?;
    let orientations: Vec<f32> = parse_numbers(&fields.orientations, "ORIENTATIONS")?;
    let velocities: Vec<f32> = parse_numbers(&fields.velocities, "VELOCITIES")?;

    let n = xs.len();
    if [ys.len(), ts.len(), orientations.len(), velocities.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(ProtocolError::Malformed(
            "point arrays differ in length".to_string(),
        ));
    }
    let reply_port = fields
        .port
        .trim()
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("bad PORT {:?}", fields.port)))?;

    let points = (0..n)
        .map(|i| TouchPoint {
            x: xs[i],
            y: ys[i],
            t_ms: ts[i],
            orientation_rad: orientations[i],
            velocity: velocities[i],
        })
        .collect();

    Ok(DecodeRequest {
        task,
        points,
        prev_word: fields.prev_word,
        prev_text: fields.prev_text,
        banned_words: parse_list(&fields.undo_words),
        reply_port,
    })
}

/// Decoder answer, candidates in rank order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeResponse {
    #[serde(rename = "RESULT_WORDS")]
    pub words: Vec<String>,
    #[serde(rename = "RESULT_SCORES")]
    pub scores: Vec<f64>,
}

impl DecodeResponse {
    pub fn from_candidates(candidates: &CandidateList) -> Self {
        Self {
            words: candidates.iter().map(|c| c.word.clone()).collect(),
            scores: candidates.iter().map(|c| c.score).collect(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn parse(body: &[u8]) -> Result<CandidateList, ProtocolError> {
        if body.is_empty() {
            return Err(ProtocolError::Malformed("empty reply".to_string()));
        }
        let response: Self = serde_json::from_slice(body)?;
        response.into_candidates()
    }

    pub fn into_candidates(self) -> Result<CandidateList, ProtocolError> {
        if self.words.len() != self.scores.len() {
            return Err(ProtocolError::LengthMismatch {
                words: self.words.len(),
                scores: self.scores.len(),
            });
        }
        Ok(CandidateList::new(
            self.words
                .into_iter()
                .zip(self.scores)
                .map(|(word, score)| Candidate { word, score })
                .collect(),
        ))
    }
}

/// `[a, b, c]`
pub fn list_string<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let body: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    format!("[{}]", body.join(", "))
}

// Floats always carry a fractional part (`1.0`, not `1`).
fn float_list_string(items: impl Iterator<Item = f32>) -> String {
    let body: Vec<String> = items.map(|v| format!("{v:?}")).collect();
    format!("[{}]", body.join(", "))
}

/// Inverse of [`list_string`]. Tolerates missing brackets and blank input.
pub fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_numbers<T: std::str::FromStr>(raw: &str, field: &str) -> Result<Vec<T>, ProtocolError> {
    parse_list(raw)
        .iter()
        .map(|item| {
            item.parse()
                .map_err(|_| ProtocolError::Malformed(format!("{field}: bad number {item:?}")))
        })
        .collect()
}
