//! Dataset and embedding file loaders.
//!
//! The dataset is either line-delimited JSON (one object per line) or a
//! single JSON array of objects. Any malformed record makes the whole
//! dataset unusable. The embeddings file is always line-delimited
//! `{"id": ..., "vector": [...]}` records; bad lines there are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DatasetFormat;
use crate::error::{SeedError, SeedResult};
use crate::models::{Document, EmbeddingIndex};

/// Loads the dataset in its original order.
pub fn load_documents(path: &Path, format: DatasetFormat) -> SeedResult<Vec<Document>> {
    if !path.exists() {
        return Err(SeedError::DatasetNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;

    let format = match format {
        DatasetFormat::Auto => sniff_format(&content),
        explicit => explicit,
    };

    let docs = match format {
        DatasetFormat::Json => parse_json_array(path, &content)?,
        _ => parse_json_lines(path, &content)?,
    };

    info!(path = %path.display(), documents = docs.len(), "Loaded dataset");
    Ok(docs)
}

fn sniff_format(content: &str) -> DatasetFormat {
    match content.trim_start().as_bytes().first() {
        Some(b'[') => DatasetFormat::Json,
        _ => DatasetFormat::Jsonl,
    }
}

fn parse_json_array(path: &Path, content: &str) -> SeedResult<Vec<Document>> {
    let value: Value = serde_json::from_str(content).map_err(|e| SeedError::DatasetMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let Value::Array(items) = value else {
        return Err(SeedError::DatasetMalformed {
            path: path.to_path_buf(),
            reason: "expected a JSON array of documents".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(doc) => Ok(doc),
            other => Err(SeedError::DatasetMalformed {
                path: path.to_path_buf(),
                reason: format!("element {} is not an object: {}", i, type_name(&other)),
            }),
        })
        .collect()
}

fn parse_json_lines(path: &Path, content: &str) -> SeedResult<Vec<Document>> {
    let mut docs = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| SeedError::DatasetMalformed {
            path: path.to_path_buf(),
            reason: format!("line {}: {}", i + 1, e),
        })?;
        match value {
            Value::Object(doc) => docs.push(doc),
            other => {
                return Err(SeedError::DatasetMalformed {
                    path: path.to_path_buf(),
                    reason: format!("line {} is not an object: {}", i + 1, type_name(&other)),
                })
            }
        }
    }
    Ok(docs)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Loads the id→vector index. A missing file yields an empty index.
pub fn load_embeddings(path: &Path) -> SeedResult<EmbeddingIndex> {
    let mut index = EmbeddingIndex::new();
    if !path.exists() {
        info!(path = %path.display(), "Embeddings file not found");
        return Ok(index);
    }

    let file = File::open(path).map_err(|source| SeedError::EmbeddingsUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|source| SeedError::EmbeddingsUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_embedding_line(line) {
            Ok(Some((id, vector))) => index.insert(id, vector),
            Ok(None) => debug!(line = line_no, "Skipping embeddings line: missing id or vector"),
            Err(e) => warn!(line = line_no, error = %e, "Skipping invalid embeddings line"),
        }
    }

    info!(path = %path.display(), embeddings = index.len(), "Loaded embeddings");
    Ok(index)
}

/// `Ok(None)` for a well-formed record lacking a usable id or vector,
/// `Err` when the line is not valid JSON or the vector is not numeric.
fn parse_embedding_line(line: &str) -> Result<Option<(String, Vec<f64>)>, String> {
    let row: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;

    let id = match row.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(None),
    };
    let Some(Value::Array(items)) = row.get("vector") else {
        return Ok(None);
    };

    let vector = items
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| format!("non-numeric component {}", v)))
        .collect::<Result<Vec<f64>, String>>()?;

    Ok(Some((id, vector)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_json_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dataset.jsonl");
        fs::write(&path, "{\"id\":\"a\"}\n\n{\"id\":\"b\",\"title\":\"B\"}\n").unwrap();

        let docs = load_documents(&path, DatasetFormat::Auto).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["title"], "B");
    }

    #[test]
    fn loads_json_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dataset.json");
        fs::write(&path, "  [{\"id\":\"a\"},{\"id\":\"b\"},{\"id\":\"c\"}]").unwrap();

        let docs = load_documents(&path, DatasetFormat::Auto).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load_documents(&tmp.path().join("nope.json"), DatasetFormat::Auto).unwrap_err();
        assert!(matches!(err, SeedError::DatasetNotFound(_)));
    }

    #[test]
    fn object_where_array_expected_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dataset.json");
        fs::write(&path, "{\"id\":\"a\"}").unwrap();

        let err = load_documents(&path, DatasetFormat::Json).unwrap_err();
        assert!(matches!(err, SeedError::DatasetMalformed { .. }));
    }

    #[test]
    fn broken_line_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dataset.jsonl");
        fs::write(&path, "{\"id\":\"a\"}\n{\"id\":\n").unwrap();

        let err = load_documents(&path, DatasetFormat::Jsonl).unwrap_err();
        match err {
            SeedError::DatasetMalformed { reason, .. } => assert!(reason.starts_with("line 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn embeddings_skip_bad_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("emb.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"id\":\"a\",\"vector\":[0.1,0.2]}\n",
                "not json\n",
                "{\"id\":\"b\"}\n",
                "{\"id\":\"c\",\"vector\":[\"x\"]}\n",
                "{\"id\":7,\"vector\":[1,2]}\n",
            ),
        )
        .unwrap();

        let index = load_embeddings(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a"), Some(&[0.1, 0.2][..]));
        assert_eq!(index.get("7"), Some(&[1.0, 2.0][..]));
        assert_eq!(index.dimension(), Some(2));
    }

    #[test]
    fn missing_embeddings_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = load_embeddings(&tmp.path().join("none.jsonl")).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }
}
