// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label.rs - 类别名称表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::info;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum ClassTableError {
  #[error("类别表为空")]
  Empty,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 类别名称表，下标即类别编号
///
/// 启动时加载一次，之后只读；克隆共享同一份数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
  names: Arc<[Arc<str>]>,
}

impl ClassTable {
  pub fn new<I, S>(names: I) -> Result<Self, ClassTableError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let names: Arc<[Arc<str>]> = names.into_iter().map(|s| Arc::from(s.as_ref())).collect();
    if names.is_empty() {
      return Err(ClassTableError::Empty);
    }
    Ok(Self { names })
  }

  pub fn coco() -> Self {
    Self {
      names: COCO_CLASSES.iter().map(|&s| Arc::from(s)).collect(),
    }
  }

  /// 从文件加载：`.json` 为字符串数组，其他格式为每行一个名称
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClassTableError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let table = if path.extension().is_some_and(|ext| ext == "json") {
      let names: Vec<String> = serde_json::from_str(&content)?;
      Self::new(names)?
    } else {
      Self::new(
        content
          .lines()
          .map(str::trim)
          .filter(|line| !line.is_empty() && !line.starts_with('#')),
      )?
    };

    info!("从 {} 加载 {} 个类别", path.display(), table.len());
    Ok(table)
  }

  pub fn get(&self, class_id: usize) -> Option<&Arc<str>> {
    self.names.get(class_id)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(|name| name.as_ref())
  }
}

impl Default for ClassTable {
  fn default() -> Self {
    Self::coco()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn coco_table() {
    let table = ClassTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.get(0).map(|s| s.as_ref()), Some("person"));
    assert_eq!(table.get(79).map(|s| s.as_ref()), Some("toothbrush"));
    assert!(table.get(80).is_none());
  }

  #[test]
  fn empty_table_is_rejected() {
    assert!(matches!(
      ClassTable::new(Vec::<String>::new()),
      Err(ClassTableError::Empty)
    ));
  }

  #[test]
  fn loads_text_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# custom labels").unwrap();
    writeln!(file, "helmet").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "  vest  ").unwrap();

    let table = ClassTable::from_path(file.path()).unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["helmet", "vest"]);
  }

  #[test]
  fn loads_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"["cat", "dog", "bird"]"#).unwrap();

    let table = ClassTable::from_path(file.path()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(2).map(|s| s.as_ref()), Some("bird"));
  }

  #[test]
  fn malformed_json_reports_error() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{{not json").unwrap();

    assert!(matches!(
      ClassTable::from_path(file.path()),
      Err(ClassTableError::JsonError(_))
    ));
  }
}
