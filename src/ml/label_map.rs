//! ラベル文字列 ↔ キー（0始まりの整数）の対応表

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 学習データに現れた順でキーを割り当てる
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelMap {
    labels: Vec<String>,
    index: HashMap<String, u32>,
}

impl LabelMap {
    /// 出現順にラベルを登録する
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::default();
        for label in labels {
            map.insert(label.as_ref());
        }
        map
    }

    fn insert(&mut self, label: &str) -> u32 {
        if let Some(&key) = self.index.get(label) {
            return key;
        }
        let key = self.labels.len() as u32;
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), key);
        key
    }

    pub fn encode(&self, label: &str) -> Option<u32> {
        self.index.get(label).copied()
    }

    pub fn decode(&self, key: u32) -> Option<&str> {
        self.labels.get(key as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// キー順のラベル一覧
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl From<Vec<String>> for LabelMap {
    fn from(labels: Vec<String>) -> Self {
        Self::fit(labels)
    }
}

impl From<LabelMap> for Vec<String> {
    fn from(map: LabelMap) -> Self {
        map.labels
    }
}
