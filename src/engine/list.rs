//! 列表状态机：Master 命令列表与 Sub-Agent 工具调用列表共用的抽象机
//!
//! 元素只能由规划轮创建、由重评估轮整表替换；状态迁移只有
//! pending -> executing -> completed / failed 三条路径，且同一时刻至多一个 executing。
//! 重评估时，新列表与已知元素（当前列表 + 历史）按 same_operation 对齐，
//! 引擎记录的 completed / failed 优先于 oracle 的声明。

use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ConsistencyError;

/// 元素状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ElementStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ElementStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, ElementStatus::Completed | ElementStatus::Failed)
    }
}

impl fmt::Display for ElementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementStatus::Pending => "pending",
            ElementStatus::Executing => "executing",
            ElementStatus::Completed => "completed",
            ElementStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 列表元素：Command 或 ToolCall
pub trait ListElement: Clone + fmt::Debug + Send + Sync {
    /// 两个元素是否表示同一操作（重评估时对齐新旧列表）
    fn same_operation(&self, other: &Self) -> bool;

    /// 日志与错误信息里使用的短标签
    fn label(&self) -> String;

    /// 元素引用的 id；知识累积器不得丢弃仍被待执行元素引用的 id
    fn referenced_ids(&self) -> Vec<String>;
}

/// 列表中的一项：元素 + 顺序 + 状态
#[derive(Debug, Clone)]
pub struct Entry<E> {
    pub element: E,
    pub order: u32,
    pub status: ElementStatus,
    /// 已执行次数（每次进入 executing 加一）
    pub attempts: u32,
    pub failure: Option<String>,
}

impl<E> Entry<E> {
    pub fn pending(element: E, order: u32) -> Self {
        Self {
            element,
            order,
            status: ElementStatus::Pending,
            attempts: 0,
            failure: None,
        }
    }

    pub fn with_status(mut self, status: ElementStatus) -> Self {
        self.status = status;
        self
    }
}

/// 重评估对齐结果（用于日志与测试）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// oracle 要求重试且未超上限的失败元素
    pub retried: Vec<String>,
    /// oracle 要求重试但已达上限、保持 failed 的元素
    pub retry_capped: Vec<String>,
    /// oracle 声明与引擎记录冲突、以引擎记录为准的元素
    pub overridden: Vec<String>,
    /// 已完成的可重复元素被再次列出、作为新元素重新执行
    pub rerun: Vec<String>,
    /// 重评估断言完成且无未决元素
    pub complete: bool,
}

/// 有序元素列表
#[derive(Debug, Clone)]
pub struct ListEngine<E> {
    entries: Vec<Entry<E>>,
    /// 已解决且被新快照省略的元素；用于识别「已执行过」的操作
    history: Vec<Entry<E>>,
    max_attempts: u32,
}

impl<E: ListElement> ListEngine<E> {
    /// max_retries：同一失败元素最多被重新执行的次数
    pub fn new(max_retries: u32) -> Self {
        Self {
            entries: Vec::new(),
            history: Vec::new(),
            max_attempts: max_retries.saturating_add(1),
        }
    }

    /// 建立初始列表：所有元素置为 pending，清空历史
    pub fn initialize(&mut self, entries: Vec<Entry<E>>) -> Result<(), ConsistencyError> {
        validate_orders(&entries)?;
        let mut entries: Vec<Entry<E>> = entries
            .into_iter()
            .map(|mut e| {
                e.status = ElementStatus::Pending;
                e.attempts = 0;
                e.failure = None;
                e
            })
            .collect();
        entries.sort_by_key(|e| e.order);
        self.entries = entries;
        self.history.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.history.clear();
    }

    pub fn entries(&self) -> &[Entry<E>] {
        &self.entries
    }

    pub fn history(&self) -> &[Entry<E>] {
        &self.history
    }

    pub fn get(&self, order: u32) -> Option<&Entry<E>> {
        self.entries.iter().find(|e| e.order == order)
    }

    pub fn executing(&self) -> Option<&Entry<E>> {
        self.entries.iter().find(|e| e.status == ElementStatus::Executing)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Entry<E>> {
        self.entries.iter().filter(|e| e.status == ElementStatus::Pending)
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.status.is_resolved()).count()
    }

    /// 下一个可分配的 order（当前与历史中的最大值 + 1）
    pub fn next_order(&self) -> u32 {
        self.entries
            .iter()
            .chain(self.history.iter())
            .map(|e| e.order)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// 最小 order 的 pending 元素；若该元素被确认闸门阻塞则返回 None（不越过它执行后面的元素）
    pub fn next_runnable(&self, blocked: impl Fn(&E) -> bool) -> Option<u32> {
        if self.executing().is_some() {
            return None;
        }
        let head = self.pending().min_by_key(|e| e.order)?;
        if blocked(&head.element) {
            None
        } else {
            Some(head.order)
        }
    }

    pub fn mark_executing(&mut self, order: u32) -> Result<(), ConsistencyError> {
        if let Some(current) = self.executing() {
            return Err(ConsistencyError::AlreadyExecuting(current.element.label()));
        }
        let entry = self.entry_mut(order)?;
        if entry.status != ElementStatus::Pending {
            return Err(ConsistencyError::NotRunnable(entry.element.label()));
        }
        entry.status = ElementStatus::Executing;
        entry.attempts += 1;
        entry.failure = None;
        tracing::debug!(element = %entry.element.label(), attempt = entry.attempts, "executing");
        Ok(())
    }

    pub fn mark_completed(&mut self, order: u32) -> Result<(), ConsistencyError> {
        let entry = self.executing_entry_mut(order)?;
        entry.status = ElementStatus::Completed;
        tracing::debug!(element = %entry.element.label(), "completed");
        Ok(())
    }

    pub fn mark_failed(&mut self, order: u32, reason: impl Into<String>) -> Result<(), ConsistencyError> {
        let entry = self.executing_entry_mut(order)?;
        let reason = reason.into();
        tracing::debug!(element = %entry.element.label(), %reason, "failed");
        entry.status = ElementStatus::Failed;
        entry.failure = Some(reason);
        Ok(())
    }

    /// 标记失败且不允许重试（结果未知的写操作）
    pub fn mark_failed_no_retry(
        &mut self,
        order: u32,
        reason: impl Into<String>,
    ) -> Result<(), ConsistencyError> {
        let max_attempts = self.max_attempts;
        self.mark_failed(order, reason)?;
        let entry = self.entry_mut(order)?;
        entry.attempts = entry.attempts.max(max_attempts);
        Ok(())
    }

    /// 将所有满足 pred 的 pending 元素直接置为 failed 且不再重试（如用户拒绝确认后的写操作）
    pub fn drop_pending(&mut self, pred: impl Fn(&E) -> bool, reason: &str) -> usize {
        let max_attempts = self.max_attempts;
        let mut dropped = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.status == ElementStatus::Pending && pred(&e.element))
        {
            entry.status = ElementStatus::Failed;
            entry.failure = Some(reason.to_string());
            entry.attempts = max_attempts;
            dropped += 1;
        }
        dropped
    }

    /// 引擎记录的该操作状态（当前列表优先，其次历史）
    pub fn known_status(&self, element: &E) -> Option<ElementStatus> {
        self.find_known(element).map(|(_, e)| e.status)
    }

    /// 原子替换元素序列
    ///
    /// 失败时列表保持原状。规则：
    /// - 仍处于 executing 的元素必须在新列表中以 completed / failed 出现，否则 DroppedExecuting
    /// - 新列表不得含 executing 元素，order 必须 >= 1 且唯一
    /// - 已 completed 的操作不会被重新执行；已 failed 的操作重试次数受上限约束
    /// - 从未执行的元素不能被声明为 completed
    /// - is_complete 为真时不得残留 pending 元素
    pub fn apply_reassessment(
        &mut self,
        proposed: Vec<Entry<E>>,
        is_complete: bool,
    ) -> Result<Reconciliation, ConsistencyError> {
        self.apply_reassessment_with(proposed, is_complete, |_| false)
    }

    /// 同 apply_reassessment；repeatable 为真的已完成元素（只读调用）
    /// 在未断言完成的轮次里以 pending 再次列出时作为新元素执行
    pub fn apply_reassessment_with(
        &mut self,
        proposed: Vec<Entry<E>>,
        is_complete: bool,
        repeatable: impl Fn(&E) -> bool,
    ) -> Result<Reconciliation, ConsistencyError> {
        validate_orders(&proposed)?;

        if let Some(exec) = self.executing() {
            let resolved = proposed.iter().any(|p| {
                p.element.same_operation(&exec.element) && p.status.is_resolved()
            });
            if !resolved {
                return Err(ConsistencyError::DroppedExecuting(exec.element.label()));
            }
        }

        let mut report = Reconciliation::default();
        let mut next: Vec<Entry<E>> = Vec::with_capacity(proposed.len());
        let mut matched_known: HashSet<usize> = HashSet::new();

        for mut p in proposed {
            let label = p.element.label();
            if p.status == ElementStatus::Executing {
                return Err(ConsistencyError::ExecutingInReassessment(label));
            }

            let known = self.find_known(&p.element).filter(|(_, known)| {
                let rerun = known.status == ElementStatus::Completed
                    && p.status == ElementStatus::Pending
                    && !is_complete
                    && repeatable(&p.element);
                if rerun {
                    report.rerun.push(label.clone());
                }
                !rerun
            });
            match known {
                Some((idx, known)) => {
                    if let KnownRef::Current(i) = idx {
                        matched_known.insert(i);
                    }
                    p.attempts = known.attempts;
                    match known.status {
                        ElementStatus::Completed => {
                            if p.status != ElementStatus::Completed {
                                report.overridden.push(label.clone());
                            }
                            p.status = ElementStatus::Completed;
                            p.failure = None;
                        }
                        ElementStatus::Failed => match p.status {
                            ElementStatus::Pending if known.attempts < self.max_attempts => {
                                report.retried.push(label.clone());
                            }
                            ElementStatus::Pending => {
                                tracing::warn!(element = %label, attempts = known.attempts, "retry cap reached, keeping element failed");
                                report.retry_capped.push(label.clone());
                                p.status = ElementStatus::Failed;
                                p.failure = known.failure.clone();
                            }
                            _ => {
                                if p.status != ElementStatus::Failed {
                                    report.overridden.push(label.clone());
                                }
                                p.status = ElementStatus::Failed;
                                p.failure = p.failure.or_else(|| known.failure.clone());
                            }
                        },
                        ElementStatus::Executing => {
                            // 上面已确认其在新列表中被解决
                            if !p.status.is_resolved() {
                                return Err(ConsistencyError::DroppedExecuting(label));
                            }
                        }
                        ElementStatus::Pending => {
                            if p.status == ElementStatus::Completed {
                                return Err(ConsistencyError::CompletedWithoutExecution(label));
                            }
                        }
                    }
                }
                None => {
                    if p.status == ElementStatus::Completed {
                        return Err(ConsistencyError::CompletedWithoutExecution(label));
                    }
                    p.attempts = 0;
                }
            }

            if p.status == ElementStatus::Failed && p.failure.is_none() {
                p.failure = Some("skipped by reassessment".to_string());
            }
            next.push(p);
        }

        let unresolved = next.iter().filter(|e| !e.status.is_resolved()).count();
        if is_complete && unresolved > 0 {
            return Err(ConsistencyError::PrematureCompletion(unresolved));
        }

        // 提交：当前列表中已解决但未出现在新列表里的元素转入历史；未执行的被新快照取代
        let old = std::mem::take(&mut self.entries);
        for (i, entry) in old.into_iter().enumerate() {
            if !matched_known.contains(&i) && entry.status.is_resolved() {
                self.history.push(entry);
            }
        }
        next.sort_by_key(|e| e.order);
        self.entries = next;
        report.complete = is_complete;

        if !report.overridden.is_empty() {
            tracing::warn!(elements = ?report.overridden, "reassessment contradicted recorded statuses; engine record kept");
        }
        Ok(report)
    }

    fn entry_mut(&mut self, order: u32) -> Result<&mut Entry<E>, ConsistencyError> {
        self.entries
            .iter_mut()
            .find(|e| e.order == order)
            .ok_or(ConsistencyError::UnknownOrder(order))
    }

    fn executing_entry_mut(&mut self, order: u32) -> Result<&mut Entry<E>, ConsistencyError> {
        let entry = self.entry_mut(order)?;
        if entry.status != ElementStatus::Executing {
            return Err(ConsistencyError::NotExecuting(entry.element.label()));
        }
        Ok(entry)
    }

    /// 在当前列表（优先）与历史（最近优先）中查找同一操作
    fn find_known(&self, element: &E) -> Option<(KnownRef, Entry<E>)> {
        if let Some((i, e)) = self
            .entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.element.same_operation(element))
        {
            return Some((KnownRef::Current(i), e.clone()));
        }
        self.history
            .iter()
            .rev()
            .find(|e| e.element.same_operation(element))
            .map(|e| (KnownRef::History, e.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
enum KnownRef {
    Current(usize),
    History,
}

fn validate_orders<E: ListElement>(entries: &[Entry<E>]) -> Result<(), ConsistencyError> {
    let mut seen = HashSet::new();
    for e in entries {
        if e.order == 0 {
            return Err(ConsistencyError::InvalidOrder(e.element.label()));
        }
        if !seen.insert(e.order) {
            return Err(ConsistencyError::DuplicateOrder(e.order));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Op(&'static str);

    impl ListElement for Op {
        fn same_operation(&self, other: &Self) -> bool {
            self.0 == other.0
        }
        fn label(&self) -> String {
            self.0.to_string()
        }
        fn referenced_ids(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn engine(ops: &[&'static str]) -> ListEngine<Op> {
        let mut list = ListEngine::new(2);
        list.initialize(
            ops.iter()
                .enumerate()
                .map(|(i, op)| Entry::pending(Op(op), i as u32 + 1))
                .collect(),
        )
        .unwrap();
        list
    }

    fn executing_count(list: &ListEngine<Op>) -> usize {
        list.entries()
            .iter()
            .filter(|e| e.status == ElementStatus::Executing)
            .count()
    }

    #[test]
    fn test_next_runnable_is_lowest_order_pending() {
        let mut list = ListEngine::new(2);
        list.initialize(vec![Entry::pending(Op("b"), 2), Entry::pending(Op("a"), 1)])
            .unwrap();
        assert_eq!(list.next_runnable(|_| false), Some(1));
        list.mark_executing(1).unwrap();
        assert_eq!(list.next_runnable(|_| false), None);
        list.mark_completed(1).unwrap();
        assert_eq!(list.next_runnable(|_| false), Some(2));
    }

    #[test]
    fn test_blocked_head_is_not_skipped() {
        let list = engine(&["write", "read"]);
        assert_eq!(list.next_runnable(|op| op.0 == "write"), None);
    }

    #[test]
    fn test_at_most_one_executing() {
        let mut list = engine(&["a", "b"]);
        list.mark_executing(1).unwrap();
        assert!(matches!(
            list.mark_executing(2),
            Err(ConsistencyError::AlreadyExecuting(_))
        ));
        assert_eq!(executing_count(&list), 1);
    }

    #[test]
    fn test_initialize_rejects_duplicate_and_zero_orders() {
        let mut list: ListEngine<Op> = ListEngine::new(2);
        assert_eq!(
            list.initialize(vec![Entry::pending(Op("a"), 1), Entry::pending(Op("b"), 1)]),
            Err(ConsistencyError::DuplicateOrder(1))
        );
        assert!(matches!(
            list.initialize(vec![Entry::pending(Op("a"), 0)]),
            Err(ConsistencyError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_dropping_executing_element_is_rejected_atomically() {
        let mut list = engine(&["a", "b"]);
        list.mark_executing(1).unwrap();
        let err = list
            .apply_reassessment(vec![Entry::pending(Op("b"), 2)], false)
            .unwrap_err();
        assert_eq!(err, ConsistencyError::DroppedExecuting("a".to_string()));
        // 列表未被修改
        assert_eq!(list.entries().len(), 2);
        assert_eq!(list.executing().map(|e| e.order), Some(1));
    }

    #[test]
    fn test_executing_resolved_by_reassessment_is_accepted() {
        let mut list = engine(&["a", "b"]);
        list.mark_executing(1).unwrap();
        let report = list
            .apply_reassessment(
                vec![
                    Entry::pending(Op("a"), 1).with_status(ElementStatus::Failed),
                    Entry::pending(Op("b"), 2),
                ],
                false,
            )
            .unwrap();
        assert!(!report.complete);
        assert_eq!(list.get(1).unwrap().status, ElementStatus::Failed);
        assert_eq!(executing_count(&list), 0);
    }

    #[test]
    fn test_completed_operation_never_reruns() {
        let mut list = engine(&["a"]);
        list.mark_executing(1).unwrap();
        list.mark_completed(1).unwrap();
        // oracle 把已完成的操作重新列为 pending
        let report = list
            .apply_reassessment(vec![Entry::pending(Op("a"), 5)], false)
            .unwrap();
        assert_eq!(report.overridden, vec!["a".to_string()]);
        assert_eq!(list.next_runnable(|_| false), None);
        assert_eq!(list.unresolved_count(), 0);
    }

    #[test]
    fn test_omitted_resolved_elements_move_to_history() {
        let mut list = engine(&["a", "b"]);
        list.mark_executing(1).unwrap();
        list.mark_completed(1).unwrap();
        list.apply_reassessment(vec![Entry::pending(Op("b"), 3)], false)
            .unwrap();
        assert_eq!(list.history().len(), 1);
        assert_eq!(list.next_order(), 4);
        // 历史中的完成记录仍阻止重新执行
        list.apply_reassessment(vec![Entry::pending(Op("a"), 4), Entry::pending(Op("b"), 3)], false)
            .unwrap();
        assert_eq!(list.get(4).unwrap().status, ElementStatus::Completed);
    }

    #[test]
    fn test_failed_retry_is_capped() {
        let mut list = engine(&["flaky"]);
        for round in 0..3 {
            let order = list.next_runnable(|_| false).expect("retry allowed");
            list.mark_executing(order).unwrap();
            list.mark_failed(order, "network").unwrap();
            let report = list
                .apply_reassessment(vec![Entry::pending(Op("flaky"), order + 1)], false)
                .unwrap();
            if round < 2 {
                assert_eq!(report.retried.len(), 1);
            } else {
                assert_eq!(report.retry_capped.len(), 1);
            }
        }
        assert_eq!(list.next_runnable(|_| false), None);
        assert_eq!(list.entries()[0].attempts, 3);
    }

    #[test]
    fn test_completed_claim_without_execution_is_rejected() {
        let mut list = engine(&["a"]);
        let err = list
            .apply_reassessment(
                vec![Entry::pending(Op("a"), 1).with_status(ElementStatus::Completed)],
                true,
            )
            .unwrap_err();
        assert_eq!(err, ConsistencyError::CompletedWithoutExecution("a".to_string()));
    }

    #[test]
    fn test_premature_completion_is_rejected() {
        let mut list = engine(&["a"]);
        let err = list
            .apply_reassessment(vec![Entry::pending(Op("a"), 1)], true)
            .unwrap_err();
        assert_eq!(err, ConsistencyError::PrematureCompletion(1));
    }

    #[test]
    fn test_executing_status_from_oracle_is_rejected() {
        let mut list = engine(&["a"]);
        let err = list
            .apply_reassessment(
                vec![Entry::pending(Op("a"), 1).with_status(ElementStatus::Executing)],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ConsistencyError::ExecutingInReassessment(_)));
    }

    #[test]
    fn test_replaying_resolved_list_is_idempotent() {
        let mut list = engine(&["a", "b"]);
        for order in [1, 2] {
            list.mark_executing(order).unwrap();
            list.mark_completed(order).unwrap();
        }
        let resolved: Vec<Entry<Op>> = list.entries().to_vec();
        let before: Vec<(u32, ElementStatus, u32)> = list
            .entries()
            .iter()
            .map(|e| (e.order, e.status, e.attempts))
            .collect();

        for _ in 0..3 {
            let report = list.apply_reassessment(resolved.clone(), true).unwrap();
            assert!(report.complete);
            assert_eq!(list.next_runnable(|_| false), None);
        }
        let after: Vec<(u32, ElementStatus, u32)> = list
            .entries()
            .iter()
            .map(|e| (e.order, e.status, e.attempts))
            .collect();
        assert_eq!(before, after);
        assert!(list.history().is_empty());
    }

    #[test]
    fn test_possibly_applied_failure_is_not_retried() {
        let mut list = engine(&["write"]);
        list.mark_executing(1).unwrap();
        list.mark_failed_no_retry(1, "timed out").unwrap();
        let report = list
            .apply_reassessment(vec![Entry::pending(Op("write"), 2)], false)
            .unwrap();
        assert_eq!(report.retry_capped, vec!["write".to_string()]);
        assert_eq!(list.next_runnable(|_| false), None);
        assert_eq!(list.known_status(&Op("write")), Some(ElementStatus::Failed));
    }

    #[test]
    fn test_repeatable_completed_element_runs_again() {
        let mut list = engine(&["read"]);
        list.mark_executing(1).unwrap();
        list.mark_completed(1).unwrap();
        let repeatable = |op: &Op| op.0 == "read";

        let report = list
            .apply_reassessment_with(
                vec![Entry::pending(Op("write"), 2), Entry::pending(Op("read"), 3)],
                false,
                repeatable,
            )
            .unwrap();
        assert_eq!(report.rerun, vec!["read".to_string()]);
        assert_eq!(list.get(3).unwrap().status, ElementStatus::Pending);
        assert_eq!(list.get(3).unwrap().attempts, 0);

        list.mark_executing(2).unwrap();
        list.mark_completed(2).unwrap();
        // 写操作仍不会重跑，只读调用再次执行
        list.apply_reassessment_with(
            vec![Entry::pending(Op("write"), 4), Entry::pending(Op("read"), 3)],
            false,
            repeatable,
        )
        .unwrap();
        assert_eq!(list.get(4).unwrap().status, ElementStatus::Completed);
        assert_eq!(list.next_runnable(|_| false), Some(3));

        // 断言完成时再次列出的只读调用按已完成处理
        list.mark_executing(3).unwrap();
        list.mark_completed(3).unwrap();
        let report = list
            .apply_reassessment_with(vec![Entry::pending(Op("read"), 5)], true, repeatable)
            .unwrap();
        assert!(report.rerun.is_empty());
        assert!(report.complete);
    }

    #[test]
    fn test_drop_pending_marks_failed() {
        let mut list = engine(&["read", "write"]);
        let dropped = list.drop_pending(|op| op.0 == "write", "declined by user");
        assert_eq!(dropped, 1);
        assert_eq!(list.get(2).unwrap().status, ElementStatus::Failed);
        assert_eq!(list.get(1).unwrap().status, ElementStatus::Pending);
        // 被拒绝的写操作再次提出时保持 failed
        let report = list
            .apply_reassessment(vec![Entry::pending(Op("read"), 1), Entry::pending(Op("write"), 3)], false)
            .unwrap();
        assert_eq!(report.retry_capped, vec!["write".to_string()]);
    }

    /// 随机的对抗性重评估序列下，executing 元素始终不超过一个
    #[test]
    fn test_adversarial_sequences_keep_single_executing() {
        let names = ["a", "b", "c", "d"];
        let statuses = [
            ElementStatus::Pending,
            ElementStatus::Executing,
            ElementStatus::Completed,
            ElementStatus::Failed,
        ];
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut list = engine(&["a", "b"]);
        for _ in 0..500 {
            if let Some(order) = list.next_runnable(|_| false) {
                list.mark_executing(order).unwrap();
                if next() % 2 == 0 {
                    list.mark_completed(order).unwrap();
                } else {
                    list.mark_failed(order, "boom").unwrap();
                }
            }
            let len = (next() % 4) as usize;
            let proposed: Vec<Entry<Op>> = (0..len)
                .map(|i| {
                    let name = names[(next() % 4) as usize];
                    let status = statuses[(next() % 4) as usize];
                    Entry::pending(Op(name), (next() % 6) as u32 + i as u32)
                        .with_status(status)
                })
                .collect();
            let _ = list.apply_reassessment(proposed, next() % 3 == 0);
            assert!(executing_count(&list) <= 1);
        }
    }
}
