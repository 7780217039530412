//! 确认闸门
//!
//! Idle -> AwaitingConfirmation(p) -> Confirmed -> Idle。
//! AwaitingConfirmation 期间任何写操作都不得进入 executing；
//! 只有上游识别出的明确肯定信号才能推进到 Confirmed，闸门自身不做推断。
//!
//! 风险矩阵：
//!
//! | scope  | 可撤销 | 要求                 |
//! |--------|--------|----------------------|
//! | single | 是     | 无                   |
//! | bulk   | 是     | 带数量的简单确认     |
//! | single | 否     | 带预览的确认         |
//! | bulk   | 否     | 强警告 + 预览的确认  |

use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ConsistencyError;
use crate::llm::PendingActionDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Single,
    Bulk,
}

impl Scope {
    pub fn from_count(count: u32) -> Self {
        if count > 1 {
            Scope::Bulk
        } else {
            Scope::Single
        }
    }
}

/// 风险矩阵给出的闸门要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GateRequirement {
    None,
    CountConfirmation,
    PreviewConfirmation,
    StrongWarning,
}

impl GateRequirement {
    pub fn for_action(scope: Scope, reversible: bool) -> Self {
        match (scope, reversible) {
            (Scope::Single, true) => GateRequirement::None,
            (Scope::Bulk, true) => GateRequirement::CountConfirmation,
            (Scope::Single, false) => GateRequirement::PreviewConfirmation,
            (Scope::Bulk, false) => GateRequirement::StrongWarning,
        }
    }

    pub fn needs_preview(self) -> bool {
        matches!(
            self,
            GateRequirement::PreviewConfirmation | GateRequirement::StrongWarning
        )
    }
}

impl fmt::Display for GateRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateRequirement::None => "no confirmation",
            GateRequirement::CountConfirmation => "a confirmation with count",
            GateRequirement::PreviewConfirmation => "a confirmation with preview",
            GateRequirement::StrongWarning => "a strong warning with preview",
        };
        f.write_str(s)
    }
}

/// 等待用户确认的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub action_type: String,
    pub count: u32,
    pub confirmed: bool,
    pub risk_level: RiskLevel,
    pub scope: Scope,
    pub reversible: bool,
    pub preview: Option<String>,
}

impl PendingAction {
    /// 从 oracle 文档构造：scope 缺省按 count 推断，reversible 缺省为 true；
    /// bulk 可撤销动作缺少预览时以数量生成一条
    pub fn from_doc(doc: &PendingActionDoc) -> Self {
        let scope = doc.scope.unwrap_or_else(|| Scope::from_count(doc.count));
        let reversible = doc.reversible.unwrap_or(true);
        let preview = doc
            .preview
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| {
                (scope == Scope::Bulk && reversible)
                    .then(|| format!("{} item(s) affected by {}", doc.count, doc.action_type))
            });
        Self {
            action_type: doc.action_type.clone(),
            count: doc.count,
            confirmed: false,
            risk_level: doc.risk_level,
            scope,
            reversible,
            preview,
        }
    }

    pub fn requirement(&self) -> GateRequirement {
        GateRequirement::for_action(self.scope, self.reversible)
    }

    /// 面向用户的确认提问
    pub fn prompt(&self) -> String {
        let what = self.action_type.replace('_', " ");
        let mut text = match self.requirement() {
            GateRequirement::StrongWarning => format!(
                "WARNING: this will {what} {} item(s) and cannot be undone.",
                self.count
            ),
            GateRequirement::PreviewConfirmation => {
                format!("This will {what} {} item(s) and cannot be undone.", self.count)
            }
            _ => format!("This will {what} {} item(s).", self.count),
        };
        if let Some(preview) = &self.preview {
            text.push('\n');
            text.push_str(preview);
        }
        text.push_str("\nReply 'yes' to proceed or 'no' to cancel.");
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Idle,
    AwaitingConfirmation(PendingAction),
    Confirmed(PendingAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// 没有等待中的动作（重复或过期的确认），不产生任何迁移
    Stale,
}

/// 一次确认所批准的写操作：请求确认时排队的工具与条目 id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApprovedScope {
    tools: BTreeSet<String>,
    ids: BTreeSet<String>,
}

impl ApprovedScope {
    pub fn from_writes(writes: &[WriteIntent]) -> Self {
        Self {
            tools: writes.iter().map(|w| w.tool.clone()).collect(),
            ids: writes.iter().flat_map(|w| w.ids.iter().cloned()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn contains(&self, other: &ApprovedScope) -> bool {
        other.tools.is_subset(&self.tools) && other.ids.is_subset(&self.ids)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationGate {
    state: GateState,
    scope: ApprovedScope,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, GateState::AwaitingConfirmation(_))
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, GateState::Confirmed(_))
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        match &self.state {
            GateState::AwaitingConfirmation(p) | GateState::Confirmed(p) => Some(p),
            GateState::Idle => None,
        }
    }

    /// 进入等待确认，writes 为本轮排队的写操作。
    /// 已确认的动作被原样再次报告（类型、数量、可撤销性不变且写操作未超出已批准范围）时保持 Confirmed
    pub fn request(&mut self, action: PendingAction, writes: &[WriteIntent]) {
        let scope = ApprovedScope::from_writes(writes);
        if let GateState::Confirmed(p) = &self.state {
            if p.action_type == action.action_type
                && p.count == action.count
                && p.reversible == action.reversible
                && self.scope.contains(&scope)
            {
                return;
            }
            tracing::info!(action = %action.action_type, "confirmed action changed; asking again");
        }
        tracing::info!(
            action = %action.action_type,
            count = action.count,
            risk = ?action.risk_level,
            "awaiting confirmation"
        );
        self.state = GateState::AwaitingConfirmation(action);
        self.scope = scope;
    }

    /// 已确认的动作是否覆盖该写操作
    pub fn covers(&self, write: &WriteIntent) -> bool {
        let GateState::Confirmed(p) = &self.state else {
            return false;
        };
        if write.count > p.count || (!write.reversible && p.reversible) {
            return false;
        }
        if self.scope.is_empty() {
            // 请求确认时尚未列出写操作：按动作类型匹配
            return p.action_type == write.action_type
                || p.action_type.ends_with(&format!("_{}", write.action_type));
        }
        self.scope.tools.contains(&write.tool)
            && write.ids.iter().all(|id| self.scope.ids.contains(id))
    }

    pub fn confirm(&mut self) -> ConfirmOutcome {
        match std::mem::take(&mut self.state) {
            GateState::AwaitingConfirmation(mut p) => {
                p.confirmed = true;
                tracing::info!(action = %p.action_type, "confirmed");
                self.state = GateState::Confirmed(p);
                ConfirmOutcome::Confirmed
            }
            other => {
                tracing::warn!("confirmation received with no pending action; ignored");
                self.state = other;
                ConfirmOutcome::Stale
            }
        }
    }

    /// 用户拒绝：丢弃等待中的动作
    pub fn decline(&mut self) -> Option<PendingAction> {
        match std::mem::take(&mut self.state) {
            GateState::AwaitingConfirmation(p) => {
                tracing::info!(action = %p.action_type, "declined");
                self.scope = ApprovedScope::default();
                Some(p)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// 已确认的动作所涉及的写操作全部解决后回到 Idle
    pub fn settle(&mut self, writes_outstanding: bool) {
        if self.is_confirmed() && !writes_outstanding {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.scope = ApprovedScope::default();
    }
}

/// 本轮排队中的写操作（用于闸门一致性校验）
#[derive(Debug, Clone)]
pub struct WriteIntent {
    pub tool: String,
    pub action_type: String,
    pub ids: Vec<String>,
    pub count: u32,
    pub reversible: bool,
}

impl WriteIntent {
    pub fn requirement(&self) -> GateRequirement {
        GateRequirement::for_action(Scope::from_count(self.count), self.reversible)
    }
}

/// 校验一轮 Sub-Agent 输出与风险矩阵是否一致
pub fn validate_round(
    needs_confirmation: bool,
    pending: Option<&PendingAction>,
    gate: &ConfirmationGate,
    writes: &[WriteIntent],
) -> Result<(), ConsistencyError> {
    if needs_confirmation {
        let p = pending.ok_or(ConsistencyError::MissingPendingAction)?;
        if p.requirement().needs_preview() && p.preview.is_none() {
            return Err(ConsistencyError::MissingPreview(p.action_type.clone()));
        }
        // 用户看到的确认提问必须至少与排队写操作同样严格
        if let Some(w) = writes
            .iter()
            .find(|w| w.count > p.count || w.requirement() > p.requirement())
        {
            return Err(ConsistencyError::UngatedWrite {
                tool: w.tool.clone(),
                required: w.requirement().to_string(),
            });
        }
        return Ok(());
    }

    if let Some(p) = pending {
        if p.risk_level == RiskLevel::High && p.scope == Scope::Bulk {
            return Err(ConsistencyError::UnconfirmedHighRiskBulk(p.action_type.clone()));
        }
    }

    // 已确认范围之外的写操作照常走风险矩阵
    if let Some(w) = writes
        .iter()
        .find(|w| w.requirement() != GateRequirement::None && !gate.covers(w))
    {
        return Err(ConsistencyError::UngatedWrite {
            tool: w.tool.clone(),
            required: w.requirement().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> PendingActionDoc {
        serde_json::from_value(value).unwrap()
    }

    fn bulk_archive() -> PendingAction {
        PendingAction::from_doc(&doc(json!({
            "type": "bulk_archive", "count": 47, "confirmed": false, "risk_level": "medium"
        })))
    }

    #[test]
    fn test_risk_matrix() {
        assert_eq!(GateRequirement::for_action(Scope::Single, true), GateRequirement::None);
        assert_eq!(
            GateRequirement::for_action(Scope::Bulk, true),
            GateRequirement::CountConfirmation
        );
        assert_eq!(
            GateRequirement::for_action(Scope::Single, false),
            GateRequirement::PreviewConfirmation
        );
        assert_eq!(
            GateRequirement::for_action(Scope::Bulk, false),
            GateRequirement::StrongWarning
        );
    }

    #[test]
    fn test_from_doc_infers_scope_and_preview() {
        let p = bulk_archive();
        assert_eq!(p.scope, Scope::Bulk);
        assert!(p.reversible);
        assert!(p.preview.as_deref().unwrap().contains("47"));
        assert!(!p.confirmed);
    }

    #[test]
    fn test_gate_transitions() {
        let mut gate = ConfirmationGate::new();
        gate.request(bulk_archive(), &[]);
        assert!(gate.is_awaiting());
        assert_eq!(gate.confirm(), ConfirmOutcome::Confirmed);
        assert!(gate.pending().unwrap().confirmed);
        gate.settle(true);
        assert!(gate.is_confirmed());
        gate.settle(false);
        assert_eq!(gate.state(), &GateState::Idle);
    }

    #[test]
    fn test_stale_confirmation_is_noop() {
        let mut gate = ConfirmationGate::new();
        assert_eq!(gate.confirm(), ConfirmOutcome::Stale);
        assert_eq!(gate.state(), &GateState::Idle);

        gate.request(bulk_archive(), &[]);
        gate.confirm();
        assert_eq!(gate.confirm(), ConfirmOutcome::Stale);
        assert!(gate.is_confirmed());
    }

    #[test]
    fn test_request_keeps_confirmed_same_action() {
        let mut gate = ConfirmationGate::new();
        gate.request(bulk_archive(), &[]);
        gate.confirm();
        gate.request(bulk_archive(), &[]);
        assert!(gate.is_confirmed());
    }

    #[test]
    fn test_decline_returns_to_idle() {
        let mut gate = ConfirmationGate::new();
        assert!(gate.decline().is_none());
        gate.request(bulk_archive(), &[]);
        assert_eq!(gate.decline().unwrap().count, 47);
        assert_eq!(gate.state(), &GateState::Idle);
    }

    #[test]
    fn test_high_risk_bulk_without_confirmation_rejected() {
        let p = PendingAction::from_doc(&doc(json!({
            "type": "bulk_delete", "count": 12, "risk_level": "high", "reversible": false,
            "preview": "12 emails from bob"
        })));
        let gate = ConfirmationGate::new();
        assert_eq!(
            validate_round(false, Some(&p), &gate, &[]),
            Err(ConsistencyError::UnconfirmedHighRiskBulk("bulk_delete".to_string()))
        );
        assert!(validate_round(true, Some(&p), &gate, &[]).is_ok());
    }

    #[test]
    fn test_irreversible_requires_preview() {
        let p = PendingAction::from_doc(&doc(json!({
            "type": "delete", "count": 1, "risk_level": "medium", "reversible": false
        })));
        assert!(p.preview.is_none());
        assert_eq!(
            validate_round(true, Some(&p), &ConfirmationGate::new(), &[]),
            Err(ConsistencyError::MissingPreview("delete".to_string()))
        );
        assert!(p.prompt().contains("cannot be undone"));
    }

    #[test]
    fn test_needs_confirmation_without_pending_action() {
        assert_eq!(
            validate_round(true, None, &ConfirmationGate::new(), &[]),
            Err(ConsistencyError::MissingPendingAction)
        );
    }

    fn write(tool: &str, action_type: &str, n: usize, reversible: bool) -> WriteIntent {
        let ids: Vec<String> = (1..=n).map(|i| format!("m{i}")).collect();
        WriteIntent {
            tool: tool.to_string(),
            action_type: action_type.to_string(),
            count: ids.len() as u32,
            ids,
            reversible,
        }
    }

    fn confirmed_archive(n: u32, writes: &[WriteIntent]) -> ConfirmationGate {
        let mut gate = ConfirmationGate::new();
        gate.request(
            PendingAction::from_doc(&doc(json!({
                "type": "bulk_archive", "count": n, "risk_level": "medium"
            }))),
            writes,
        );
        gate.confirm();
        gate
    }

    #[test]
    fn test_ungated_bulk_write_rejected() {
        let writes = vec![write("archive_emails", "archive", 47, true)];
        let gate = ConfirmationGate::new();
        assert!(matches!(
            validate_round(false, None, &gate, &writes),
            Err(ConsistencyError::UngatedWrite { .. })
        ));

        let single = vec![write("archive_emails", "archive", 1, true)];
        assert!(validate_round(false, None, &gate, &single).is_ok());

        let confirmed = confirmed_archive(47, &writes);
        assert!(validate_round(false, None, &confirmed, &writes).is_ok());
    }

    #[test]
    fn test_confirmation_does_not_cover_other_writes() {
        let approved = vec![write("archive_emails", "archive", 2, true)];
        let gate = confirmed_archive(2, &approved);

        // 不同工具、不可撤销
        let delete = vec![write("delete_emails", "delete", 3, false)];
        assert!(!gate.covers(&delete[0]));
        assert!(matches!(
            validate_round(false, None, &gate, &delete),
            Err(ConsistencyError::UngatedWrite { .. })
        ));

        // 同一工具但超出已批准的条目
        let more = vec![write("archive_emails", "archive", 3, true)];
        assert!(!gate.covers(&more[0]));
        assert!(validate_round(false, None, &gate, &more).is_err());

        // 已批准范围内的子集
        let subset = vec![write("archive_emails", "archive", 2, true)];
        assert!(validate_round(false, None, &gate, &subset).is_ok());
    }

    #[test]
    fn test_confirmation_without_listed_writes_matches_action_type() {
        let gate = confirmed_archive(5, &[]);
        assert!(gate.covers(&write("archive_emails", "archive", 5, true)));
        assert!(!gate.covers(&write("archive_emails", "archive", 6, true)));
        assert!(!gate.covers(&write("label_emails", "label", 2, true)));
    }

    #[test]
    fn test_changed_request_asks_again() {
        let approved = vec![write("archive_emails", "archive", 2, true)];
        let mut gate = confirmed_archive(2, &approved);

        let grown = vec![write("archive_emails", "archive", 3, true)];
        gate.request(
            PendingAction::from_doc(&doc(json!({
                "type": "bulk_archive", "count": 3, "risk_level": "medium"
            }))),
            &grown,
        );
        assert!(gate.is_awaiting());
        assert_eq!(gate.pending().unwrap().count, 3);
        assert!(!gate.covers(&grown[0]));
    }

    #[test]
    fn test_confirmation_prompt_must_match_queued_writes() {
        let archive = PendingAction::from_doc(&doc(json!({
            "type": "bulk_archive", "count": 2, "risk_level": "medium"
        })));
        let gate = ConfirmationGate::new();
        let delete = vec![write("delete_emails", "delete", 2, false)];
        assert!(matches!(
            validate_round(true, Some(&archive), &gate, &delete),
            Err(ConsistencyError::UngatedWrite { .. })
        ));
        let bigger = vec![write("archive_emails", "archive", 4, true)];
        assert!(validate_round(true, Some(&archive), &gate, &bigger).is_err());
    }

    #[test]
    fn test_strong_warning_prompt() {
        let p = PendingAction::from_doc(&doc(json!({
            "type": "bulk_delete", "count": 30, "risk_level": "high", "reversible": false,
            "preview": "30 newsletters"
        })));
        let prompt = p.prompt();
        assert!(prompt.starts_with("WARNING"));
        assert!(prompt.contains("30 newsletters"));
    }
}
