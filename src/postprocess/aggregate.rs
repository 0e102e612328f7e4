// 该文件是 rknn-yolo-post 项目的一部分。
// src/postprocess/aggregate.rs - 多尺度候选框汇总
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

use std::collections::BTreeMap;

use crate::postprocess::{Candidate, DecodeError};

/// 按发现顺序排列的候选框集合，下标即发现顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
  candidates: Vec<Candidate>,
}

impl CandidateSet {
  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
    self.candidates.iter()
  }

  pub fn as_slice(&self) -> &[Candidate] {
    &self.candidates
  }

  /// 类别 -> 该类别候选框下标（保持发现顺序）
  pub fn group_by_class(&self) -> BTreeMap<u32, Vec<usize>> {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, candidate) in self.candidates.iter().enumerate() {
      groups.entry(candidate.class_id).or_default().push(idx);
    }
    groups
  }
}

impl From<Vec<Candidate>> for CandidateSet {
  fn from(candidates: Vec<Candidate>) -> Self {
    Self { candidates }
  }
}

impl<'a> IntoIterator for &'a CandidateSet {
  type Item = &'a Candidate;
  type IntoIter = std::slice::Iter<'a, Candidate>;

  fn into_iter(self) -> Self::IntoIter {
    self.candidates.iter()
  }
}

/// 依尺度顺序拼接各尺度的解码结果，遇到第一个错误即返回
pub fn aggregate<I>(per_scale: I) -> Result<CandidateSet, DecodeError>
where
  I: IntoIterator<Item = Result<Vec<Candidate>, DecodeError>>,
{
  let mut candidates = Vec::new();
  for scale in per_scale {
    candidates.extend(scale?);
  }
  Ok(CandidateSet { candidates })
}
