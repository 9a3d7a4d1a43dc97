use shared::domain::{SessionId, Stage, StageStatus};

/// Identity of the active server-side session plus the pipeline position.
///
/// Created empty, bound to a session id by the first successful upload and
/// mutated only through [`activate`](Self::activate) and
/// [`complete`](Self::complete), both of which are idempotent. `reset`
/// restores the pristine pre-upload state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: Option<SessionId>,
    stage: Stage,
    status: [StageStatus; 5],
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let mut status = [StageStatus::Pending; 5];
        status[Stage::Upload.index()] = StageStatus::Active;
        Self {
            session_id: None,
            stage: Stage::Upload,
            status,
        }
    }

    /// Binds the backend-issued session id. The id is immutable once set;
    /// a new upload must go through [`reset`](Self::reset) first.
    pub fn begin(&mut self, session_id: SessionId) {
        if self.session_id.is_none() {
            self.session_id = Some(session_id);
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        self.status[stage.index()]
    }

    pub fn statuses(&self) -> [StageStatus; 5] {
        self.status
    }

    /// Makes `stage` the active one and refreshes every stage's visual
    /// state relative to it: earlier stages show completed, later stages
    /// pending. Idempotent.
    pub fn activate(&mut self, stage: Stage) {
        self.stage = stage;
        for s in Stage::ALL {
            self.status[s.index()] = match s.cmp(&stage) {
                std::cmp::Ordering::Less => StageStatus::Completed,
                std::cmp::Ordering::Equal => StageStatus::Active,
                std::cmp::Ordering::Greater => StageStatus::Pending,
            };
        }
    }

    /// Marks `stage` completed without changing which stage is active.
    /// Idempotent.
    pub fn complete(&mut self, stage: Stage) {
        self.status[stage.index()] = StageStatus::Completed;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_upload_active_and_no_session() {
        let ctx = SessionContext::new();
        assert_eq!(ctx.session_id(), None);
        assert_eq!(ctx.stage(), Stage::Upload);
        assert_eq!(ctx.stage_status(Stage::Upload), StageStatus::Active);
        for stage in [Stage::Column, Stage::Categories, Stage::Classify, Stage::Results] {
            assert_eq!(ctx.stage_status(stage), StageStatus::Pending);
        }
    }

    #[test]
    fn complete_is_idempotent() {
        let mut ctx = SessionContext::new();
        for _ in 0..4 {
            ctx.complete(Stage::Upload);
            assert_eq!(ctx.stage_status(Stage::Upload), StageStatus::Completed);
        }
        // Repeated completion never disturbs the active stage.
        assert_eq!(ctx.stage(), Stage::Upload);
    }

    #[test]
    fn activate_is_idempotent() {
        let mut ctx = SessionContext::new();
        ctx.activate(Stage::Categories);
        let snapshot = ctx.clone();
        ctx.activate(Stage::Categories);
        assert_eq!(ctx, snapshot);
    }

    #[test]
    fn complete_does_not_move_the_active_stage() {
        let mut ctx = SessionContext::new();
        ctx.complete(Stage::Upload);
        ctx.activate(Stage::Column);
        ctx.complete(Stage::Column);
        assert_eq!(ctx.stage(), Stage::Column);
        assert_eq!(ctx.stage_status(Stage::Column), StageStatus::Completed);
    }

    #[test]
    fn session_id_is_immutable_once_set() {
        let mut ctx = SessionContext::new();
        ctx.begin(SessionId("first".into()));
        ctx.begin(SessionId("second".into()));
        assert_eq!(ctx.session_id(), Some(&SessionId("first".into())));

        ctx.reset();
        assert_eq!(ctx.session_id(), None);
        ctx.begin(SessionId("second".into()));
        assert_eq!(ctx.session_id(), Some(&SessionId("second".into())));
    }
}
