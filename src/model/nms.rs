// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{geometry::iou, model::DetectItem};

/// 贪心非极大值抑制（不区分类别）
///
/// 按置信度稳定降序排序后依次取出最高分框，移除与其 IoU 不低于
/// `iou_threshold` 的其余框。结果按置信度降序，任意两框 IoU 均小于阈值。
pub fn suppress(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  // sort_by 是稳定排序，同分时保持输入顺序
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let total = items.len();
  let mut suppressed = vec![false; total];
  for i in 0..total {
    if suppressed[i] {
      continue;
    }
    let (head, tail) = items.split_at(i + 1);
    let pivot = &head[i];
    for (offset, other) in tail.iter().enumerate() {
      let j = i + 1 + offset;
      if !suppressed[j] && iou(&pivot.bbox, &other.bbox) >= iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  let kept: Vec<DetectItem> = items
    .into_iter()
    .zip(suppressed)
    .filter_map(|(item, suppressed)| (!suppressed).then_some(item))
    .collect();

  debug!("NMS 保留 {} / {} 个检测框", kept.len(), total);
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;
  use std::sync::Arc;

  fn item(label: &str, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id: 0,
      label: Arc::from(label),
      score,
      bbox,
    }
  }

  #[test]
  fn empty_input() {
    assert!(suppress(Vec::new(), 0.7).is_empty());
  }

  #[test]
  fn single_item_is_returned_unchanged() {
    let only = item("person", 0.9, [0.0, 0.0, 640.0, 640.0]);
    assert_eq!(suppress(vec![only.clone()], 0.7), vec![only]);
  }

  #[test]
  fn overlapping_lower_scores_are_removed() {
    let items = vec![
      item("a", 0.6, [0.0, 0.0, 100.0, 100.0]),
      item("b", 0.9, [2.0, 2.0, 102.0, 102.0]),
      item("c", 0.8, [300.0, 300.0, 400.0, 400.0]),
    ];
    let kept = suppress(items, 0.7);
    let labels: Vec<_> = kept.iter().map(|i| i.label.as_ref()).collect();
    assert_eq!(labels, vec!["b", "c"]);
  }

  #[test]
  fn suppression_ignores_class() {
    let mut cat = item("cat", 0.8, [0.0, 0.0, 10.0, 10.0]);
    cat.class_id = 15;
    let dog = item("dog", 0.7, [0.0, 0.0, 10.0, 10.0]);
    let kept = suppress(vec![dog, cat.clone()], 0.7);
    assert_eq!(kept, vec![cat]);
  }

  #[test]
  fn threshold_is_inclusive() {
    // IoU 恰好为 0.5
    let a = item("a", 0.9, [0.0, 0.0, 30.0, 10.0]);
    let b = item("b", 0.8, [10.0, 0.0, 40.0, 10.0]);
    assert_eq!(iou(&a.bbox, &b.bbox), 0.5);
    assert_eq!(suppress(vec![a.clone(), b.clone()], 0.5), vec![a.clone()]);
    assert_eq!(suppress(vec![a.clone(), b.clone()], 0.51).len(), 2);
  }

  #[test]
  fn equal_scores_keep_input_order() {
    let first = item("first", 0.5, [0.0, 0.0, 10.0, 10.0]);
    let second = item("second", 0.5, [0.0, 0.0, 10.0, 10.0]);
    let far = item("far", 0.5, [50.0, 50.0, 60.0, 60.0]);
    let kept = suppress(vec![first.clone(), far.clone(), second], 0.7);
    assert_eq!(kept, vec![first, far]);
  }

  fn items() -> impl Strategy<Value = Vec<DetectItem>> {
    prop::collection::vec(
      (
        0.0f32..1.0,
        0.0f32..200.0,
        0.0f32..200.0,
        1.0f32..80.0,
        1.0f32..80.0,
      ),
      0..40,
    )
    .prop_map(|raw| {
      raw
        .into_iter()
        .enumerate()
        .map(|(n, (score, x, y, w, h))| item(&n.to_string(), score, [x, y, x + w, y + h]))
        .collect()
    })
  }

  proptest! {
    #[test]
    fn survivors_are_a_sorted_non_overlapping_subset(input in items(), threshold in 0.05f32..1.0) {
      let kept = suppress(input.clone(), threshold);
      prop_assert!(kept.len() <= input.len());
      for item in &kept {
        prop_assert!(input.contains(item));
      }
      for pair in kept.windows(2) {
        prop_assert!(pair[0].score >= pair[1].score);
      }
      for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
          prop_assert!(iou(&a.bbox, &b.bbox) < threshold);
        }
      }
    }

    #[test]
    fn suppression_is_idempotent(input in items(), threshold in 0.05f32..1.0) {
      let once = suppress(input, threshold);
      let twice = suppress(once.clone(), threshold);
      prop_assert_eq!(once, twice);
    }
  }
}
