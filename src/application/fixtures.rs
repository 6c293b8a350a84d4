//! 预测用例加载
//!
//! 用例文件格式：`{"X": [{"Round": ..., "air_date_group": ..., "Question": ...}], "y": [...]}`

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::domain::model::PredictionRecord;
use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureFeatures {
    #[serde(rename = "Round")]
    pub round: Value,
    pub air_date_group: Value,
    #[serde(rename = "Question")]
    pub question: Value,
}

/// 一个预测用例
///
/// 只能经 `from_slice` / `load_fixtures` 构造，保证至少有一行特征。
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionFixture {
    #[serde(skip)]
    path: PathBuf,
    #[serde(rename = "X")]
    features: Vec<FixtureFeatures>,
    #[serde(rename = "y", default)]
    labels: Vec<Value>,
}

/// 字符串原样返回，其余 JSON 值取其文本形式
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 取整数标签，对象取第一个整数字段
fn label_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.values().find_map(label_value),
        _ => None,
    }
}

impl PredictionFixture {
    pub fn from_slice(path: &Path, bytes: &[u8]) -> RelayResult<Self> {
        let mut fixture: PredictionFixture = serde_json::from_slice(bytes).map_err(|err| {
            RelayError::config(format!("invalid fixture {}: {err}", path.display()))
        })?;
        if fixture.features.is_empty() {
            return Err(RelayError::config(format!(
                "fixture {} has no X rows",
                path.display()
            )));
        }
        fixture.path = path.to_path_buf();
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn features(&self) -> &[FixtureFeatures] {
        &self.features
    }

    pub fn labels(&self) -> &[Value] {
        &self.labels
    }

    /// 以首行特征和给定的预测值构造预测记录
    pub fn to_record(&self, value: i32) -> RelayResult<PredictionRecord> {
        let first = self.features.first().ok_or_else(|| {
            RelayError::config(format!("fixture {} has no X rows", self.path.display()))
        })?;
        Ok(PredictionRecord::new(
            stringify(&first.round),
            stringify(&first.air_date_group),
            stringify(&first.question),
            value,
        ))
    }

    /// 用例中记录的期望标签
    pub fn recorded_label(&self) -> Option<i32> {
        self.labels
            .first()
            .and_then(label_value)
            .and_then(|v| i32::try_from(v).ok())
    }
}

/// 按文件名顺序读取目录中所有 `*.json` 用例
pub fn load_fixtures(dir: &Path) -> RelayResult<Vec<PredictionFixture>> {
    let entries = fs::read_dir(dir).map_err(|err| {
        RelayError::config(format!("unable to read fixtures dir {}: {err}", dir.display()))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path).map_err(|err| {
                RelayError::config(format!("unable to read fixture {}: {err}", path.display()))
            })?;
            PredictionFixture::from_slice(path, &bytes)
        })
        .collect()
}
