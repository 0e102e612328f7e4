// 该文件是 rknn-yolo-post 项目的一部分。
// src/postprocess/nms.rs - 按类别的贪心非极大值抑制
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

use std::cmp::Ordering;

use tracing::trace;

use crate::postprocess::{Candidate, CandidateSet, CenterBox};

/// 计算两个边界框的 IoU，不相交或并集为零时为 0
pub fn iou(a: &CenterBox, b: &CenterBox) -> f32 {
  let [a_l, a_t, a_r, a_b] = a.to_ltrb();
  let [b_l, b_t, b_r, b_b] = b.to_ltrb();

  let inter_w = (a_r.min(b_r) - a_l.max(b_l)).max(0.0);
  let inter_h = (a_b.min(b_b) - a_t.max(b_t)).max(0.0);
  let intersection = inter_w * inter_h;
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    (intersection / union).clamp(0.0, 1.0)
  } else {
    0.0
  }
}

/// 分数降序
fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
  b.score.total_cmp(&a.score)
}

/// 对每个类别独立做贪心 NMS。
///
/// 同类候选按分数降序稳定排序（并列时保持发现顺序），依次保留最高者并
/// 剔除与其 IoU 超过 `nms_threshold` 的候选。各类别的保留结果最终按
/// 分数降序、发现顺序升序合并。
pub fn suppress(set: CandidateSet, nms_threshold: f32) -> CandidateSet {
  let candidates = set.as_slice();
  let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());

  for (class_id, mut order) in set.group_by_class() {
    order.sort_by(|&i, &j| by_score_desc(&candidates[i], &candidates[j]));

    let mut removed = vec![false; order.len()];
    for i in 0..order.len() {
      if removed[i] {
        continue;
      }
      let best = &candidates[order[i]];
      kept.push(order[i]);

      for j in (i + 1)..order.len() {
        if !removed[j] && iou(&best.bbox, &candidates[order[j]].bbox) > nms_threshold {
          removed[j] = true;
        }
      }
    }

    trace!(
      "类别 {}: 候选 {}, 抑制 {}",
      class_id,
      order.len(),
      removed.iter().filter(|&&r| r).count()
    );
  }

  kept.sort_by(|&i, &j| by_score_desc(&candidates[i], &candidates[j]).then(i.cmp(&j)));
  CandidateSet::from(kept.into_iter().map(|idx| candidates[idx]).collect::<Vec<_>>())
}
