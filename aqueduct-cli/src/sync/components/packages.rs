use async_trait::async_trait;

use super::ComponentSyncer;
use crate::api::{Entity, Kind, PackageInstall};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;
use crate::sync::state::DiffAction;

/// Python packages, matched by name and runtime.
///
/// Packages are installed, never created: either from the destination's
/// package index or, in offline mode, from the wheel stored on the source.
pub struct Packages;

impl Packages {
    pub async fn sync_package(&self, ctx: &mut SyncContext, package: &Entity) -> SyncResult<()> {
        let name = package.label();
        if ctx.state.skip_if_excluded(Kind::Package, &name) {
            return Ok(());
        }
        let identity = Identity::of(Kind::Package, package)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Package, &key) {
            return Ok(());
        }
        let result = self.install(ctx, package, &identity).await;
        ctx.state.finish(Kind::Package, &key, result.is_ok());
        result
    }

    async fn install(
        &self,
        ctx: &mut SyncContext,
        package: &Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        let label = identity.to_string();
        let request = PackageInstall::from_entity(package).map_err(|reason| {
            SyncError::ModelValidation {
                kind: Kind::Package,
                name: label.clone(),
                reason,
            }
        })?;

        let action = match ctx.find_on_destination(Kind::Package, identity).await? {
            Some(installed) if installed.str("version") == Some(request.version.as_str()) => {
                ctx.state.output(format!(
                    "Package '{}' version {} is already installed on destination.",
                    label, request.version
                ));
                return Ok(());
            }
            Some(_) => DiffAction::Updated,
            None => DiffAction::Added,
        };

        if ctx.is_dry_run() {
            ctx.state.record_diff(Kind::Package, label.clone(), action);
            ctx.state.output(format!(
                "Dry run: package '{}' version {} would be installed on destination.",
                label, request.version
            ));
            return Ok(());
        }

        ctx.state.output(format!(
            "Installing package '{}' version {} on destination.",
            label, request.version
        ));
        let installed = if ctx.state.options.offline {
            let file_id = package
                .str("fileId")
                .ok_or_else(|| SyncError::access(Kind::Package, label.clone(), "/fileId"))?;
            let wheel = ctx.source.download_plugin(file_id).await.map_err(|e| {
                SyncError::api(Kind::Package, "download", label.clone(), ctx.source.host(), e)
            })?;
            let filename = package
                .str("fileName")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{}-py3-none-any.whl", request.name, request.version));
            ctx.destination
                .install_package_offline(&filename, wheel, &request)
                .await
        } else {
            ctx.destination.install_package(&request).await
        };
        installed.map_err(|source| match action {
            DiffAction::Added => SyncError::Add {
                kind: Kind::Package,
                name: label.clone(),
                source,
            },
            DiffAction::Updated => SyncError::Update {
                kind: Kind::Package,
                name: label.clone(),
                source,
            },
        })?;
        ctx.state.record_diff(Kind::Package, label.clone(), action);
        ctx.state.output(format!(
            "Successfully installed package '{}' on destination.",
            label
        ));
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Packages {
    fn kind(&self) -> Kind {
        Kind::Package
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync python packages from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for package in ctx.list_source(Kind::Package).await? {
            self.sync_package(ctx, &package).await?;
        }
        ctx.state.output("Completed syncing of python packages.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sync::state::RunOptions;
    use crate::sync::testing::{Call, MemoryInstance, context, dry_run, live};

    #[tokio::test]
    async fn test_missing_and_outdated_packages_are_installed() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Package, json!({"name": "requests", "version": "2.31.0", "pythonVersion": "Python3"}));
        source.seed(Kind::Package, json!({"name": "pyyaml", "version": "6.0", "pythonVersion": "Python3"}));
        source.seed(Kind::Package, json!({"name": "six", "version": "1.16.0", "pythonVersion": "Python3"}));
        destination.seed(Kind::Package, json!({"name": "pyyaml", "version": "5.4", "pythonVersion": "Python3"}));
        destination.seed(Kind::Package, json!({"name": "six", "version": "1.16.0", "pythonVersion": "Python3"}));

        let mut ctx = context(&source, &destination, live());
        Packages.sync(&mut ctx).await.unwrap();

        let installed: Vec<String> = destination
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::InstallPackage(p) => Some(p.name),
                _ => None,
            })
            .collect();
        assert_eq!(installed, vec!["requests".to_string(), "pyyaml".to_string()]);
        assert_eq!(
            ctx.state.diff_log().get(Kind::Package, "pyyaml (Python3)"),
            Some(DiffAction::Updated)
        );
    }

    #[tokio::test]
    async fn test_offline_install_transfers_the_wheel() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(
            Kind::Package,
            json!({"name": "requests", "version": "2.31.0", "pythonVersion": "Python3", "fileId": "wheel-1", "fileName": "requests-2.31.0-py3-none-any.whl"}),
        );
        source.seed_file("wheel-1", b"wheel-bytes".to_vec());

        let options = RunOptions {
            offline: true,
            ..live()
        };
        let mut ctx = context(&source, &destination, options);
        Packages.sync(&mut ctx).await.unwrap();

        assert!(matches!(
            destination.calls().as_slice(),
            [Call::InstallPackageOffline(filename, _)] if filename == "requests-2.31.0-py3-none-any.whl"
        ));
    }

    #[tokio::test]
    async fn test_failed_install_leaves_the_diff_log_untouched() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        let listed = source.seed(
            Kind::Package,
            json!({"name": "requests", "version": "2.31.0", "pythonVersion": "Python3"}),
        );
        destination.fail_adds_of(Kind::Package, "requests");

        let mut ctx = context(&source, &destination, live());
        let err = Packages.sync_package(&mut ctx, &listed).await.unwrap_err();

        assert!(matches!(err, SyncError::Add { kind: Kind::Package, .. }));
        assert!(destination.calls().is_empty());
        assert!(ctx.state.diff_log().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_package_record_fails_validation() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Package, json!({"name": "requests", "version": "", "pythonVersion": "Python3"}));

        let mut ctx = context(&source, &destination, dry_run());
        let err = Packages.sync(&mut ctx).await.unwrap_err();
        assert!(matches!(err, SyncError::ModelValidation { .. }));
    }
}
