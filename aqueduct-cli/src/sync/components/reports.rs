use async_trait::async_trait;

use super::{Applications, ComponentSyncer, Outcome, reconcile};
use crate::api::{Entity, Kind, ReportView};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;
use crate::sync::remap::{remap_id_list, remap_report_columns};
use crate::sync::state::DiffAction;

/// Saved reports.
///
/// Ordinary reports are matched through the id translation table. The
/// "Default" report every application owns is matched through its application
/// instead, and only overwritten when default-report updates are enabled.
pub struct Reports;

impl Reports {
    pub async fn sync_report(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Report, &name) {
            return Ok(());
        }
        let report = ctx.source_item(Kind::Report, listed).await?;
        let (is_default, application_id) = {
            let view = ReportView::parse(&report)
                .map_err(|path| SyncError::access(Kind::Report, name.clone(), path))?;
            (view.is_default(), view.application_id.to_string())
        };
        let key = if is_default {
            format!("default:{}", application_id)
        } else {
            Identity::of(Kind::Report, &report)?.key()
        };
        if !ctx.state.begin(Kind::Report, &key) {
            return Ok(());
        }
        let result = self
            .reconcile_report(ctx, &name, report, is_default, &application_id)
            .await;
        ctx.state.finish(Kind::Report, &key, result.is_ok());
        result
    }

    async fn reconcile_report(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut report: Entity,
        is_default: bool,
        application_id: &str,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing report '{}'.", name));
        let destination_app = Applications.resolve(ctx, application_id).await?;
        let state = &ctx.state;
        remap_id_list(&mut report, "applicationIds", |id| {
            state.resolved_id(Kind::Application, id)
        });
        remap_report_columns(&mut report, ctx.state.tracking_ids());

        if is_default {
            return self
                .reconcile_default(ctx, report, application_id, destination_app.as_deref())
                .await;
        }

        let identity = Identity::of(Kind::Report, &report)?;
        let source_id = report.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Report, &identity).await?;
        reconcile(ctx, Kind::Report, name, source_id.as_deref(), report, existing).await?;
        Ok(())
    }

    async fn reconcile_default(
        &self,
        ctx: &mut SyncContext,
        report: Entity,
        source_application_id: &str,
        destination_application_id: Option<&str>,
    ) -> SyncResult<()> {
        let label = format!("Default (application {})", source_application_id);
        let Some(destination_application_id) = destination_application_id else {
            if ctx.is_dry_run() {
                ctx.state.record_diff(Kind::Report, label, DiffAction::Added);
                return Ok(());
            }
            return Err(SyncError::lookup(
                Kind::Report,
                label,
                "owning application is not on destination",
            ));
        };

        let existing = ctx
            .destination
            .get_default_report_by_application_id(destination_application_id)
            .await
            .map_err(|e| {
                SyncError::api(Kind::Report, "read", label.clone(), ctx.destination.host(), e)
            })?;

        if existing.is_some() && !ctx.state.options.update_default_reports {
            ctx.state.output(format!(
                "Report '{}' exists on destination and default report updates are disabled; leaving it.",
                label
            ));
            return Ok(());
        }
        let source_id = report.id().map(str::to_string);
        let outcome = reconcile(ctx, Kind::Report, &label, source_id.as_deref(), report, existing)
            .await?;
        if outcome == Outcome::Held {
            log::debug!("Default report '{}' held back by report update setting", label);
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Reports {
    fn kind(&self) -> Kind {
        Kind::Report
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync reports from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for report in ctx.list_source(Kind::Report).await? {
            match self.sync_report(ctx, &report).await {
                Ok(()) => {}
                Err(err) if err.is_lookup() => {
                    log::warn!("{}", err);
                    ctx.state
                        .output(format!("Skipping report '{}': {}", report.label(), err));
                }
                Err(err) => return Err(err),
            }
        }
        ctx.state.output("Completed syncing of reports.");
        Ok(())
    }
}
