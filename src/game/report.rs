use super::GameService;
use crate::error::{GameError, GameResult};
use crate::types::*;

impl GameService {
    /// File a report against `owner`'s submission.
    ///
    /// A player reports a given submission at most once; repeating the report
    /// returns the existing one.
    pub async fn report_submission(
        &self,
        code: &RoomCode,
        round_id: &str,
        reporter: &str,
        owner: &str,
        reason: ReportReason,
    ) -> GameResult<Report> {
        let (_, round) = self.load_member_round(code, round_id, reporter).await?;
        if reporter == owner {
            return Err(GameError::validation("You can't report your own answer"));
        }
        let Some(submission) = round.submissions.get(owner) else {
            return Err(GameError::validation("No such answer"));
        };

        let existing = self.store.list_reports().await?.into_iter().find(|r| {
            &r.room_code == code
                && r.round_id == round_id
                && r.submission_owner == owner
                && r.reported_by == reporter
        });
        if let Some(report) = existing {
            tracing::debug!("Player {} already reported {} in round {}", reporter, owner, round_id);
            return Ok(report);
        }

        let report = self
            .store
            .add_report(NewReport {
                room_code: code.clone(),
                round_id: round_id.to_string(),
                submission_owner: owner.to_string(),
                reported_by: reporter.to_string(),
                reason,
                content: submission.content.clone(),
            })
            .await?;
        tracing::info!(
            "Report {} filed against {} in room {} ({:?})",
            report.id,
            owner,
            code,
            reason
        );
        Ok(report)
    }
}
