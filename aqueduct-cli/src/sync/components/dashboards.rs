use async_trait::async_trait;

use super::{ComponentSyncer, Reports, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::identity::Identity;
use crate::sync::remap::{drop_dashboard_cards, remap_dashboard_reports};

/// Dashboards, matched by uid. Every report a card shows is reconciled first.
pub struct Dashboards;

fn card_report_ids(dashboard: &Entity) -> Vec<String> {
    dashboard
        .get("items")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|card| card.get("reportId").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect()
}

impl Dashboards {
    pub async fn sync_dashboard(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Dashboard, &name) {
            return Ok(());
        }
        let dashboard = ctx.source_item(Kind::Dashboard, listed).await?;
        let identity = Identity::of(Kind::Dashboard, &dashboard)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Dashboard, &key) {
            return Ok(());
        }
        let result = self
            .reconcile_dashboard(ctx, &name, dashboard, &identity)
            .await;
        ctx.state.finish(Kind::Dashboard, &key, result.is_ok());
        result
    }

    async fn reconcile_dashboard(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut dashboard: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing dashboard '{}'.", name));

        let mut dangling = Vec::new();
        for report_id in card_report_ids(&dashboard) {
            match ctx.source_by_id(Kind::Report, &report_id).await? {
                Some(report) => Reports.sync_report(ctx, &report).await?,
                None => {
                    log::warn!(
                        "Dashboard '{}' has a card for report '{}' which does not exist on source",
                        name,
                        report_id
                    );
                    ctx.state.add_homework(
                        Kind::Dashboard,
                        format!(
                            "Dashboard '{}' had a card for missing report '{}'; the card was left out.",
                            name, report_id
                        ),
                    );
                    dangling.push(report_id);
                }
            }
        }
        if drop_dashboard_cards(&mut dashboard, &dangling) > 0 {
            log::debug!("Dropped {} dangling cards from dashboard '{}'", dangling.len(), name);
        }
        let state = &ctx.state;
        remap_dashboard_reports(&mut dashboard, |id| state.resolved_id(Kind::Report, id));

        let source_id = dashboard.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Dashboard, identity).await?;
        reconcile(ctx, Kind::Dashboard, name, source_id.as_deref(), dashboard, existing).await?;
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Dashboards {
    fn kind(&self) -> Kind {
        Kind::Dashboard
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync dashboards from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for dashboard in ctx.list_source(Kind::Dashboard).await? {
            match self.sync_dashboard(ctx, &dashboard).await {
                Ok(()) => {}
                Err(err) if err.is_lookup() => {
                    log::warn!("{}", err);
                    ctx.state.output(format!(
                        "Skipping dashboard '{}': {}",
                        dashboard.label(),
                        err
                    ));
                }
                Err(err) => return Err(err),
            }
        }
        ctx.state.output("Completed syncing of dashboards.");
        Ok(())
    }
}
