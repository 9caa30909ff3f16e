//! リコンサイルエンジン
//!
//! [`Reconciler`] は1回の呼び出しで1つのリソースを望ましい状態へ近づける。
//! 可変状態を持たないため、1つのインスタンスで複数タスクから別々のリソースを
//! 同時に扱える。共有されるのは [`RemoteClient`] のみ。
//!
//! 待機 (コマンドキュー、プロビジョニング、削除) はすべて [`PollPolicy`] で上限が決まる。
//! 返された future を drop すると待機は止まるが、リモート操作は続き、
//! 次回のリコンサイルで拾われる。

use crate::action::{OperationPlan, ServerOperation};
use crate::catalog::ServerCatalog;
use crate::error::{CloudError, ConfigIssue, RemoteError, Result, ValidationError};
use crate::lookup::{self, Datacenter, DatacenterQuery, Image, ImageQuery};
use crate::mapper::{
    self, diff, diff_applied, from_wire_network, to_wire_create, to_wire_create_network,
    to_wire_subnet,
};
use crate::model::{
    BillingCycle, ComputeInstanceSpec, ComputeInstanceState, InstanceId, NetworkAttachment,
    NetworkId, NetworkSpec, NetworkState,
};
use crate::options::{ServerOptions, ServerOptionsSelector};
use crate::remote::{CommandId, CommandStatus, InstanceLookup, RemoteClient};
use crate::retry::{PollPolicy, poll_until};
use crate::state::{Lifecycle, LifecycleState, ManagedInstance, ManagedNetwork};
use crate::validation::Validate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// サーバーのリコンサイル結果
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub instance: ManagedInstance,

    /// 適用された変更 (新規作成時は空)
    pub plan: OperationPlan,

    pub lifecycle: Lifecycle,
}

/// サーバーとネットワークをコントロールプレーンに合わせる
pub struct Reconciler<R: ?Sized> {
    remote: Arc<R>,
    catalog: ServerCatalog,
    poll: PollPolicy,
}

impl<R: ?Sized> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            catalog: self.catalog.clone(),
            poll: self.poll.clone(),
        }
    }
}

impl<R: RemoteClient + ?Sized> Reconciler<R> {
    /// Reconciler using the built-in catalog and the default poll policy
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            catalog: ServerCatalog::builtin(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: ServerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// Replace the catalog entry of one datacenter with its remote capabilities
    pub async fn refresh_catalog(&mut self, datacenter: &str) -> Result<()> {
        let caps = self.remote.capabilities(datacenter).await?;
        self.catalog.merge_capabilities(datacenter, &caps);
        info!(datacenter = %datacenter, "refreshed server catalog");
        Ok(())
    }

    // ============ サーバー ============

    /// スペックを検証し、カタログのデフォルト値で補完する (通信なし)
    pub fn prepare(&self, spec: &ComputeInstanceSpec) -> Result<ComputeInstanceSpec> {
        spec.validate(&self.catalog)?;

        let mut prepared = spec.clone();
        if prepared.billing_cycle == BillingCycle::Monthly && prepared.monthly_traffic_package.is_none() {
            prepared.monthly_traffic_package = self
                .catalog
                .datacenter(&prepared.datacenter)
                .and_then(|dc| dc.default_traffic_package.clone());
        }
        Ok(prepared)
    }

    /// 記録がなければ作成、あればインプレースで更新
    pub async fn apply(
        &self,
        desired: &ComputeInstanceSpec,
        prior: Option<&ManagedInstance>,
    ) -> Result<ApplyOutcome> {
        let desired = self.prepare(desired)?;
        match prior {
            None => self.create(desired).await,
            Some(prior) => self.update(desired, prior).await,
        }
    }

    /// Compute the changes `apply` would make to an existing server
    pub async fn plan(&self, desired: &ComputeInstanceSpec, prior: &ManagedInstance) -> Result<OperationPlan> {
        let desired = self.prepare(desired)?;
        let observed = self.read(&prior.id).await?;
        self.plan_against(&desired, prior, &observed)
    }

    fn plan_against(
        &self,
        desired: &ComputeInstanceSpec,
        prior: &ManagedInstance,
        observed: &ComputeInstanceState,
    ) -> Result<OperationPlan> {
        let mut plan = diff(desired, observed)?;
        if !prior.imported {
            plan.extend(diff_applied(&prior.applied, desired));
        }
        Ok(plan)
    }

    async fn create(&self, desired: ComputeInstanceSpec) -> Result<ApplyOutcome> {
        let mut lifecycle = Lifecycle::starting_at(LifecycleState::Absent);

        self.check_references(&desired).await?;

        lifecycle.advance(LifecycleState::Creating);
        info!(
            server = %desired.name,
            datacenter = %desired.datacenter,
            cpu = %desired.cpu_label(),
            ram_mb = desired.ram_mb,
            "creating server"
        );

        let created = self.remote.create_instance(&to_wire_create(&desired)).await?;

        let lookup = match &created.adopted {
            Some(id) => {
                warn!(server = %desired.name, server_id = %id, "adopting server from an interrupted create");
                InstanceLookup::Id(id.clone())
            }
            None => {
                let mut name = desired.name.clone();
                for command in &created.commands {
                    let status = self.wait_command(command, "server creation").await?;
                    if let Some(created_name) = status.created_name() {
                        name = created_name.to_string();
                    }
                }
                InstanceLookup::exact_name(&name)
            }
        };

        let observed = self.wait_present(&lookup, &desired.name).await?;
        lifecycle.advance(LifecycleState::Present(observed.power));
        info!(server = %observed.name, server_id = %observed.id, power = %observed.power, "server created");

        Ok(ApplyOutcome {
            instance: ManagedInstance {
                id: observed.id.clone(),
                applied: desired,
                observed,
                generated_password: created.generated_password,
                imported: false,
            },
            plan: OperationPlan::empty(),
            lifecycle,
        })
    }

    async fn update(&self, desired: ComputeInstanceSpec, prior: &ManagedInstance) -> Result<ApplyOutcome> {
        let observed = self.read(&prior.id).await?;
        let plan = self.plan_against(&desired, prior, &observed)?;

        if let Some(change) = plan.replacement() {
            return Err(RemoteError::ReplacementRequired {
                resource: format!("server {}", prior.observed.name),
                field: change.field.clone(),
            }
            .into());
        }

        let mut lifecycle = Lifecycle::starting_at(LifecycleState::Present(observed.power));
        if !plan.has_changes() {
            debug!(server_id = %prior.id, "server is up to date");
            return Ok(ApplyOutcome {
                instance: ManagedInstance {
                    id: prior.id.clone(),
                    applied: desired,
                    observed,
                    generated_password: prior.generated_password.clone(),
                    imported: false,
                },
                plan,
                lifecycle,
            });
        }

        info!(server_id = %prior.id, summary = %plan.summary(), "updating server");
        if !plan.is_power_only() {
            lifecycle.advance(LifecycleState::Updating);
        }

        let mut completed: Vec<&'static str> = Vec::new();
        for operation in plan.operations() {
            debug!(server_id = %prior.id, operation = operation.kind(), "applying change");
            if let Err(e) = self.apply_operation(&prior.id, operation).await {
                warn!(
                    server_id = %prior.id,
                    failed = operation.kind(),
                    completed = ?completed,
                    error = %e,
                    "server update stopped part way"
                );
                return Err(e);
            }
            completed.push(operation.kind());
        }

        let observed = self.read(&prior.id).await?;
        lifecycle.advance(LifecycleState::Present(observed.power));
        info!(server_id = %prior.id, power = %observed.power, cpu = %observed.cpu_label, "server updated");

        Ok(ApplyOutcome {
            instance: ManagedInstance {
                id: prior.id.clone(),
                applied: desired,
                observed,
                generated_password: prior.generated_password.clone(),
                imported: false,
            },
            plan,
            lifecycle,
        })
    }

    async fn apply_operation(&self, id: &InstanceId, operation: &ServerOperation) -> Result<()> {
        let command = match operation {
            ServerOperation::SetPower { state } => self.remote.set_power(id, *state).await?,
            other => self.remote.update_instance(id, other).await?,
        };
        self.wait_command(&command, "server update").await?;
        Ok(())
    }

    /// サーバーの現在の状態を取得
    pub async fn read(&self, id: &InstanceId) -> Result<ComputeInstanceState> {
        let mut servers = self.remote.read_instance(&InstanceLookup::Id(id.clone())).await?;
        match servers.len() {
            1 => Ok(servers.remove(0)),
            n => Err(RemoteError::InvalidResponse(format!("expected 1 server with id {id}, got {n}")).into()),
        }
    }

    /// サーバーを削除 (既に存在しなければ何もせず成功)
    pub async fn destroy(&self, id: &InstanceId) -> Result<()> {
        info!(server_id = %id, "destroying server");

        match self.remote.destroy_instance(id).await {
            Ok(command) => {
                self.wait_command(&command, "server termination").await?;
            }
            Err(e) if e.is_not_found() => {
                info!(server_id = %id, "server already absent");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let remote = self.remote.as_ref();
        let lookup = InstanceLookup::Id(id.clone());
        poll_until(&self.poll, "server termination", || {
            let lookup = &lookup;
            async move {
                match remote.read_instance(lookup).await {
                    Ok(_) => Ok(None),
                    Err(e) if e.is_not_found() => Ok(Some(())),
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await?;

        info!(server_id = %id, "server destroyed");
        Ok(())
    }

    /// 既存サーバーをIDまたは完全一致の名前で取り込む
    pub async fn import(&self, lookup: &InstanceLookup) -> Result<ManagedInstance> {
        let lookup = match lookup {
            InstanceLookup::NameFilter(name) if !name.starts_with('^') => InstanceLookup::exact_name(name),
            other => other.clone(),
        };
        let observed = single_server(self.remote.read_instance(&lookup).await?, &lookup)?;
        info!(server = %observed.name, server_id = %observed.id, "imported server");

        Ok(ManagedInstance {
            id: observed.id.clone(),
            applied: spec_from_state(&observed),
            observed,
            generated_password: None,
            imported: true,
        })
    }

    async fn check_references(&self, spec: &ComputeInstanceSpec) -> Result<()> {
        // 公開イメージIDにはデータセンターのプレフィックスが付く (プライベートイメージ名は一覧にない)
        if spec.image_id.contains(':') {
            let images = self.remote.list_images(&spec.datacenter).await?;
            if !images.iter().any(|image| image.id == spec.image_id) {
                return Err(RemoteError::ReferenceNotFound {
                    kind: "image",
                    reference: spec.image_id.clone(),
                    available: images.into_iter().map(|image| image.id).collect(),
                }
                .into());
            }
        }

        let private: Vec<&NetworkAttachment> = spec.networks.iter().filter(|n| !n.is_wan()).collect();
        if !private.is_empty() {
            let names: Vec<String> = self
                .remote
                .read_networks(&spec.datacenter)
                .await?
                .into_iter()
                .flat_map(|n| n.names)
                .collect();
            if let Some(missing) = private.iter().find(|n| !names.contains(&n.name)) {
                return Err(RemoteError::ReferenceNotFound {
                    kind: "network",
                    reference: missing.name.clone(),
                    available: names,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn wait_command(&self, command: &CommandId, operation: &str) -> Result<CommandStatus> {
        debug!(command_id = %command, operation = %operation, "waiting for command");
        let remote = self.remote.as_ref();
        poll_until(&self.poll, operation, || async move {
            match remote.command_status(command).await? {
                CommandStatus::Pending => Ok(None),
                CommandStatus::Failed { log } => Err(CloudError::Remote(RemoteError::CommandFailed(
                    log.unwrap_or_default(),
                ))),
                complete => Ok(Some(complete)),
            }
        })
        .await
    }

    async fn wait_present(&self, lookup: &InstanceLookup, name: &str) -> Result<ComputeInstanceState> {
        let remote = self.remote.as_ref();
        poll_until(&self.poll, "server creation", || async move {
            match remote.read_instance(lookup).await {
                Ok(servers) => single_server(servers, lookup).map(Some),
                Err(e) if e.is_not_found() => {
                    debug!(server = %name, "server not visible yet");
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    // ============ ネットワーク ============

    /// プライベートネットワークを作成または更新
    pub async fn apply_network(
        &self,
        desired: &NetworkSpec,
        prior: Option<&ManagedNetwork>,
    ) -> Result<ManagedNetwork> {
        desired.validate(&self.catalog)?;
        match prior {
            None => self.create_network(desired).await,
            Some(prior) => self.update_network(desired, prior).await,
        }
    }

    async fn create_network(&self, desired: &NetworkSpec) -> Result<ManagedNetwork> {
        let request = to_wire_create_network(desired)
            .ok_or_else(|| ValidationError::InvalidConfiguration(vec![ConfigIssue::NoSubnets]))?;
        info!(network = %desired.name, datacenter = %desired.datacenter, "creating network");

        let created = self.remote.create_network(&request).await?;
        let id = created
            .network_id
            .map(NetworkId)
            .ok_or_else(|| RemoteError::InvalidResponse("network id missing from create response".to_string()))?;

        for subnet in desired.subnets.iter().skip(1) {
            let subnet_id = self
                .remote
                .create_subnet(&to_wire_subnet(&desired.datacenter, id, None, subnet))
                .await?;
            debug!(network_id = %id, subnet_id, description = %subnet.description, "added subnet");
        }

        let observed = self.read_network(&desired.datacenter, id).await?;
        info!(network = %observed.full_name, network_id = %id, "network created");
        Ok(ManagedNetwork {
            applied: desired.clone(),
            observed,
        })
    }

    async fn update_network(&self, desired: &NetworkSpec, prior: &ManagedNetwork) -> Result<ManagedNetwork> {
        for (field, changed) in [
            ("name", desired.name != prior.applied.name),
            ("datacenter", desired.datacenter != prior.applied.datacenter),
        ] {
            if changed {
                return Err(RemoteError::ReplacementRequired {
                    resource: format!("network {}", prior.observed.full_name),
                    field: field.to_string(),
                }
                .into());
            }
        }

        let datacenter = &prior.observed.datacenter;
        let id = prior.observed.id;
        let current = self.read_network(datacenter, id).await?;

        for subnet in &desired.subnets {
            match current.subnet_by_description(&subnet.description) {
                Some(existing) if existing.subnet.differs_from(subnet) => {
                    debug!(network_id = %id, subnet_id = existing.id, "editing subnet");
                    self.remote
                        .edit_subnet(&to_wire_subnet(datacenter, id, Some(existing.id), subnet))
                        .await?;
                }
                Some(_) => {}
                None => {
                    let subnet_id = self
                        .remote
                        .create_subnet(&to_wire_subnet(datacenter, id, None, subnet))
                        .await?;
                    debug!(network_id = %id, subnet_id, "added subnet");
                }
            }
        }

        for existing in &current.subnets {
            let kept = desired
                .subnets
                .iter()
                .any(|s| s.description == existing.subnet.description);
            if !kept {
                debug!(network_id = %id, subnet_id = existing.id, "deleting subnet");
                self.remote.delete_subnet(existing.id).await?;
            }
        }

        let observed = self.read_network(datacenter, id).await?;
        info!(network = %observed.full_name, network_id = %id, "network updated");
        Ok(ManagedNetwork {
            applied: desired.clone(),
            observed,
        })
    }

    /// Read a network by its identifier
    pub async fn read_network(&self, datacenter: &str, id: NetworkId) -> Result<NetworkState> {
        let networks = self.remote.read_networks(datacenter).await?;
        let wire = networks
            .iter()
            .find(|n| n.vlan_id == id.0)
            .ok_or_else(|| RemoteError::NotFound(format!("Did not find network {id} in datacenter {datacenter}")))?;
        let subnets = self.remote.list_subnets(datacenter, id).await?;
        Ok(from_wire_network(datacenter, wire, subnets)?)
    }

    /// Find a network by full or short name
    pub async fn find_network(&self, datacenter: &str, name: &str) -> Result<NetworkState> {
        let networks = self.remote.read_networks(datacenter).await?;
        let wire = networks
            .iter()
            .find(|n| {
                n.names
                    .iter()
                    .any(|full| full == name || mapper::short_network_name(full) == name)
            })
            .ok_or_else(|| RemoteError::NotFound(format!("Did not find network {name} in datacenter {datacenter}")))?;
        self.read_network(datacenter, NetworkId(wire.vlan_id)).await
    }

    /// サブネット、ネットワークの順に削除 (既に存在しなければ何もしない)
    pub async fn destroy_network(&self, network: &ManagedNetwork) -> Result<()> {
        let datacenter = &network.observed.datacenter;
        let current = match self.read_network(datacenter, network.observed.id).await {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                info!(network_id = %network.observed.id, "network already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for subnet in &current.subnets {
            self.remote.delete_subnet(subnet.id).await?;
        }
        self.remote.destroy_network(datacenter, current.network_id).await?;
        info!(network = %current.full_name, "network destroyed");
        Ok(())
    }

    // ============ 参照 ============

    pub async fn resolve_datacenter(&self, query: &DatacenterQuery) -> Result<Datacenter> {
        lookup::resolve_datacenter(self.remote.as_ref(), query).await
    }

    pub async fn resolve_image(&self, query: &ImageQuery) -> Result<Image> {
        lookup::resolve_image(self.remote.as_ref(), query).await
    }

    pub fn resolve_server_options(&self, selector: &ServerOptionsSelector) -> Result<ServerOptions> {
        Ok(selector.resolve(&self.catalog)?)
    }
}

fn single_server(
    mut servers: Vec<ComputeInstanceState>,
    lookup: &InstanceLookup,
) -> Result<ComputeInstanceState> {
    match servers.len() {
        0 => Err(RemoteError::NotFound("No servers found".to_string()).into()),
        1 => Ok(servers.remove(0)),
        _ => Err(RemoteError::ConflictDuplicate {
            kind: "server",
            name: lookup.to_string(),
        }
        .into()),
    }
}

/// Best-effort desired spec for a server that was not created by us
fn spec_from_state(state: &ComputeInstanceState) -> ComputeInstanceSpec {
    let networks = state
        .networks
        .iter()
        .map(|n| {
            if n.is_public() {
                NetworkAttachment::wan()
            } else {
                NetworkAttachment::private(n.network.clone())
            }
        })
        .collect();

    let mut spec = ComputeInstanceSpec::new(state.name.clone(), state.datacenter.clone(), String::new())
        .with_cpu(state.cpu_type.clone(), state.cpu_cores)
        .with_ram_mb(state.ram_mb)
        .with_disks(state.disk_sizes_gb.clone())
        .with_billing(state.billing_cycle)
        .with_power_on(state.power.is_on())
        .with_networks(networks);
    if state.billing_cycle == BillingCycle::Monthly {
        spec.monthly_traffic_package = state.traffic_package.clone();
    }
    spec.daily_backup = state.daily_backup;
    spec.managed = state.managed;
    spec
}
