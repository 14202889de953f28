//! Per-peer operator session
//!
//! Each mesh peer gets one session. A session starts unbound, binds to an
//! operator's wallet on the first request that resolves one, and answers
//! every request with exactly one typed response. All daemon access goes
//! through the shared wallet lease so concurrent sessions cannot fight over
//! the daemon's single open wallet.

use std::time::Instant;

use tracing::{info, warn};

use mw_protocol::{
    unix_now, BalanceRequest, BalanceResponse, CreateTxRequest, CreateTxResponse, ErrorResponse,
    ExportOutputsRequest, ExportOutputsResponse, ImportKeyImagesRequest, ImportKeyImagesResponse,
    Message, PeerId, ProvisionAck, ProvisionWalletRequest, SubmitTxRequest, SubmitTxResponse,
};
use mw_wallet_rpc::units::{from_atomic, validate_amount};
use mw_wallet_rpc::{GatewayError, ViewWalletSpec, WalletRpc};

use crate::lease::{LeaseGuard, WalletLease};
use crate::registry::{OperatorRegistry, RegistryError, WalletBinding};

/// Daemon transfer priority ceiling.
const MAX_PRIORITY: u8 = 3;

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("Wallet not found for operator")]
    WalletNotFound,

    #[error("{0}")]
    Gateway(String),

    #[error("operator registry unavailable: {0}")]
    Registry(#[from] RegistryError),
}

impl From<GatewayError> for SessionError {
    fn from(e: GatewayError) -> Self {
        SessionError::Gateway(e.peer_message())
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitingFirstMessage,
    Bound {
        operator_id: String,
        /// `None` in single-tenant fallback, where the daemon's current
        /// wallet is used as-is.
        wallet_name: Option<String>,
    },
    Closed,
}

pub struct OperatorSession<G: WalletRpc> {
    peer: PeerId,
    state: SessionState,
    lease: WalletLease<G>,
    registry: std::sync::Arc<OperatorRegistry>,
    single_tenant: bool,
    messages_handled: u64,
    started: Instant,
}

impl<G: WalletRpc> OperatorSession<G> {
    pub fn new(
        peer: PeerId,
        lease: WalletLease<G>,
        registry: std::sync::Arc<OperatorRegistry>,
        single_tenant: bool,
    ) -> Self {
        info!(peer = %peer.short(), "session opened");
        Self {
            peer,
            state: SessionState::AwaitingFirstMessage,
            lease,
            registry,
            single_tenant,
            messages_handled: 0,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one decoded message, producing exactly one response.
    pub async fn handle(&mut self, msg: Message) -> Message {
        self.messages_handled += 1;
        let correlation_id = msg.correlation_id();

        if self.state == SessionState::Closed {
            return Message::Error(ErrorResponse::new(correlation_id, "session closed"));
        }

        match msg {
            Message::BalanceRequest(req) => self.handle_balance(req).await,
            Message::ExportOutputsRequest(req) => self.handle_export_outputs(req).await,
            Message::CreateTxRequest(req) => self.handle_create_tx(req).await,
            Message::SubmitTxRequest(req) => self.handle_submit_tx(req).await,
            Message::ImportKeyImagesRequest(req) => self.handle_import_key_images(req).await,
            Message::ProvisionWalletRequest(req) => self.handle_provision(req).await,
            other => {
                warn!(peer = %self.peer.short(), kind = %other.kind(), "non-request kind at hub");
                Message::Error(ErrorResponse::new(
                    correlation_id,
                    format!("unexpected message kind: {}", other.kind()),
                ))
            }
        }
    }

    /// Tear the session down, logging its lifetime stats.
    pub fn close(&mut self) {
        info!(
            peer = %self.peer.short(),
            messages = self.messages_handled,
            lifetime_secs = self.started.elapsed().as_secs(),
            "session closed"
        );
        self.state = SessionState::Closed;
    }

    /// Make the daemon serve `operator_id`'s wallet, binding the session.
    ///
    /// Resolution order: current binding, then the durable registry, then
    /// (single-tenant only) whatever wallet the daemon already has open.
    async fn resolve_wallet(
        &mut self,
        daemon: &mut LeaseGuard<G>,
        operator_id: &str,
    ) -> Result<(), SessionError> {
        if let SessionState::Bound {
            operator_id: bound,
            wallet_name,
        } = &self.state
        {
            if bound == operator_id {
                if let Some(name) = wallet_name.clone() {
                    daemon.ensure_open(&name).await?;
                }
                return Ok(());
            }
            info!(
                peer = %self.peer.short(),
                from = bound,
                to = operator_id,
                "session rebinding to a different operator"
            );
        }

        match self.registry.lookup(operator_id)? {
            Some(binding) => {
                daemon.ensure_open(&binding.wallet_name).await?;
                self.state = SessionState::Bound {
                    operator_id: operator_id.to_string(),
                    wallet_name: Some(binding.wallet_name),
                };
                Ok(())
            }
            None if self.single_tenant => {
                warn!(
                    operator = operator_id,
                    "no registry binding; single-tenant fallback to the open wallet"
                );
                self.state = SessionState::Bound {
                    operator_id: operator_id.to_string(),
                    wallet_name: daemon.open_wallet_name().map(str::to_string),
                };
                Ok(())
            }
            None => Err(SessionError::WalletNotFound),
        }
    }

    async fn handle_balance(&mut self, req: BalanceRequest) -> Message {
        let mut daemon = self.lease.acquire().await;
        if let Err(e) = self.resolve_wallet(&mut daemon, &req.operator_id).await {
            return Message::BalanceResponse(BalanceResponse::err(req.correlation_id, e.to_string()));
        }
        if let Err(e) = daemon.gateway().refresh().await {
            warn!(error = %e, "refresh before balance failed");
        }
        match daemon.gateway().get_balance().await {
            Ok(info) => {
                let height = daemon.gateway().get_height().await.unwrap_or(0);
                Message::BalanceResponse(BalanceResponse::ok(
                    req.correlation_id,
                    from_atomic(info.balance),
                    from_atomic(info.unlocked_balance),
                    height,
                ))
            }
            Err(e) => {
                Message::BalanceResponse(BalanceResponse::err(req.correlation_id, e.peer_message()))
            }
        }
    }

    async fn handle_export_outputs(&mut self, req: ExportOutputsRequest) -> Message {
        let mut daemon = self.lease.acquire().await;
        if let Err(e) = self.resolve_wallet(&mut daemon, &req.operator_id).await {
            return Message::ExportOutputsResponse(ExportOutputsResponse::err(
                req.correlation_id,
                e.to_string(),
            ));
        }
        if let Err(e) = daemon.gateway().refresh().await {
            warn!(error = %e, "refresh before output export failed");
        }
        match daemon.gateway().export_outputs(req.all_outputs).await {
            Ok(hex) => {
                Message::ExportOutputsResponse(ExportOutputsResponse::ok(req.correlation_id, hex))
            }
            Err(e) => Message::ExportOutputsResponse(ExportOutputsResponse::err(
                req.correlation_id,
                e.peer_message(),
            )),
        }
    }

    async fn handle_create_tx(&mut self, req: CreateTxRequest) -> Message {
        if req.priority > MAX_PRIORITY {
            return Message::CreateTxResponse(CreateTxResponse::err(
                req.correlation_id,
                format!("priority must be between 0 and {MAX_PRIORITY}"),
            ));
        }
        let amount_atomic = match validate_amount(req.amount) {
            Ok(atomic) => atomic,
            Err(e) => {
                return Message::CreateTxResponse(CreateTxResponse::err(
                    req.correlation_id,
                    e.to_string(),
                ))
            }
        };

        let mut daemon = self.lease.acquire().await;
        if let Err(e) = self.resolve_wallet(&mut daemon, &req.operator_id).await {
            return Message::CreateTxResponse(CreateTxResponse::err(
                req.correlation_id,
                e.to_string(),
            ));
        }
        if let Err(e) = daemon.gateway().refresh().await {
            warn!(error = %e, "refresh before transfer creation failed");
        }
        match daemon
            .gateway()
            .create_unsigned_transfer(&req.destination, amount_atomic, req.priority)
            .await
        {
            Ok(transfer) if transfer.unsigned_txset.is_empty() => {
                Message::CreateTxResponse(CreateTxResponse::err(
                    req.correlation_id,
                    "wallet produced no unsigned transaction data",
                ))
            }
            Ok(transfer) => Message::CreateTxResponse(CreateTxResponse::ok(
                req.correlation_id,
                transfer.unsigned_txset,
                from_atomic(transfer.fee),
                req.amount,
            )),
            Err(e) => {
                Message::CreateTxResponse(CreateTxResponse::err(req.correlation_id, e.peer_message()))
            }
        }
    }

    /// Submit a signed transfer. `submit_transfer` handles cold-signed
    /// txsets; some daemon versions want `relay_tx` instead, so that is the
    /// fallback, and if both fail the relay error is what the peer sees.
    async fn handle_submit_tx(&mut self, req: SubmitTxRequest) -> Message {
        let mut daemon = self.lease.acquire().await;
        if let Err(e) = self.resolve_wallet(&mut daemon, &req.operator_id).await {
            return Message::SubmitTxResponse(SubmitTxResponse::err(
                req.correlation_id,
                e.to_string(),
            ));
        }

        match daemon.gateway().submit_signed_transfer(&req.signed_txset).await {
            Ok(hashes) => match hashes.into_iter().find(|h| !h.is_empty()) {
                Some(hash) => {
                    info!(tx_hash = %hash, "signed transfer submitted");
                    Message::SubmitTxResponse(SubmitTxResponse::ok(req.correlation_id, hash))
                }
                None => Message::SubmitTxResponse(SubmitTxResponse::err(
                    req.correlation_id,
                    "daemon returned no transaction hash",
                )),
            },
            Err(submit_err) => {
                warn!(error = %submit_err, "submit_transfer failed, relaying raw");
                match daemon.gateway().relay_raw(&req.signed_txset).await {
                    Ok(hash) => {
                        info!(tx_hash = %hash, "transfer relayed via fallback");
                        Message::SubmitTxResponse(SubmitTxResponse::ok(req.correlation_id, hash))
                    }
                    Err(relay_err) => Message::SubmitTxResponse(SubmitTxResponse::err(
                        req.correlation_id,
                        relay_err.peer_message(),
                    )),
                }
            }
        }
    }

    async fn handle_import_key_images(&mut self, req: ImportKeyImagesRequest) -> Message {
        let mut daemon = self.lease.acquire().await;
        if let Err(e) = self.resolve_wallet(&mut daemon, &req.operator_id).await {
            return Message::ImportKeyImagesResponse(ImportKeyImagesResponse::err(
                req.correlation_id,
                e.to_string(),
            ));
        }
        match daemon
            .gateway()
            .import_key_images(&req.signed_key_images, req.offset)
            .await
        {
            Ok(import) => Message::ImportKeyImagesResponse(ImportKeyImagesResponse::ok(
                req.correlation_id,
                import.height,
                import.spent,
                import.unspent,
            )),
            Err(e) => Message::ImportKeyImagesResponse(ImportKeyImagesResponse::err(
                req.correlation_id,
                e.peer_message(),
            )),
        }
    }

    /// Create a view-only wallet from the supplied view credential and bind
    /// the operator to it durably. The codec already guarantees the request
    /// carries no spend key.
    async fn handle_provision(&mut self, req: ProvisionWalletRequest) -> Message {
        let wallet_name = format!("viewonly_{}_{}", req.operator_id, unix_now() as u64);
        let spec = ViewWalletSpec {
            filename: wallet_name.clone(),
            address: req.address.clone(),
            view_key: req.view_key.clone(),
            spend_key: None,
            restore_height: req.restore_height,
        };

        let mut daemon = self.lease.acquire().await;
        if let Err(e) = daemon.gateway().create_wallet_from_keys(&spec).await {
            return Message::ProvisionAck(ProvisionAck::err(
                req.correlation_id,
                req.operator_id,
                e.peer_message(),
            ));
        }
        // generate_from_keys leaves the new wallet open on the daemon.
        daemon.note_open(&wallet_name);

        let binding = WalletBinding {
            wallet_name: wallet_name.clone(),
            address: req.address,
            created_at: unix_now() as u64,
        };
        if let Err(e) = self.registry.bind(&req.operator_id, binding) {
            return Message::ProvisionAck(ProvisionAck::err(
                req.correlation_id,
                req.operator_id,
                format!("wallet created but registry write failed: {e}"),
            ));
        }

        info!(operator = %req.operator_id, wallet = %wallet_name, "view-only wallet provisioned");
        self.state = SessionState::Bound {
            operator_id: req.operator_id.clone(),
            wallet_name: Some(wallet_name.clone()),
        };
        Message::ProvisionAck(ProvisionAck::ok(
            req.correlation_id,
            req.operator_id,
            format!("view-only wallet {wallet_name} provisioned"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::tempdir;

    use mw_protocol::SignedKeyImage;
    use mw_wallet_rpc::{BalanceInfo, KeyImageImport, SignedTransfer, UnsignedTransfer};

    #[derive(Default)]
    struct FakeGateway {
        calls: Mutex<Vec<String>>,
        fail_submit: bool,
        fail_relay: bool,
        fail_create_wallet: bool,
    }

    impl FakeGateway {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WalletRpc for FakeGateway {
        async fn get_balance(&self) -> Result<BalanceInfo, GatewayError> {
            self.record("get_balance");
            Ok(BalanceInfo {
                balance: 5_000_000_000_000,
                unlocked_balance: 4_000_000_000_000,
            })
        }

        async fn get_height(&self) -> Result<u64, GatewayError> {
            self.record("get_height");
            Ok(123_456)
        }

        async fn refresh(&self) -> Result<(), GatewayError> {
            self.record("refresh");
            Ok(())
        }

        async fn get_address(&self) -> Result<String, GatewayError> {
            self.record("get_address");
            Ok("9xAddr".into())
        }

        async fn export_outputs(&self, all_outputs: bool) -> Result<String, GatewayError> {
            self.record(format!("export_outputs({all_outputs})"));
            Ok("0utputhex".into())
        }

        async fn create_unsigned_transfer(
            &self,
            destination: &str,
            amount_atomic: u64,
            priority: u8,
        ) -> Result<UnsignedTransfer, GatewayError> {
            self.record(format!("transfer({destination},{amount_atomic},{priority})"));
            Ok(UnsignedTransfer {
                unsigned_txset: "unsigned-blob".into(),
                fee: 20_000_000,
            })
        }

        async fn submit_signed_transfer(
            &self,
            _signed_txset: &str,
        ) -> Result<Vec<String>, GatewayError> {
            self.record("submit_transfer");
            if self.fail_submit {
                return Err(GatewayError::Application {
                    code: -4,
                    message: "submit rejected".into(),
                });
            }
            Ok(vec!["hash-submit".into()])
        }

        async fn relay_raw(&self, _tx_hex: &str) -> Result<String, GatewayError> {
            self.record("relay_tx");
            if self.fail_relay {
                return Err(GatewayError::Application {
                    code: -4,
                    message: "relay rejected".into(),
                });
            }
            Ok("hash-relay".into())
        }

        async fn import_key_images(
            &self,
            images: &[SignedKeyImage],
            offset: u64,
        ) -> Result<KeyImageImport, GatewayError> {
            self.record(format!("import_key_images({},{offset})", images.len()));
            Ok(KeyImageImport {
                height: 123_450,
                spent: 1_000_000_000_000,
                unspent: 4_000_000_000_000,
            })
        }

        async fn export_key_images(
            &self,
            _all_images: bool,
        ) -> Result<Vec<SignedKeyImage>, GatewayError> {
            unreachable!("hub never exports key images")
        }

        async fn sign_transfer(&self, _unsigned_txset: &str) -> Result<SignedTransfer, GatewayError> {
            unreachable!("hub never signs")
        }

        async fn import_outputs(&self, _outputs_data_hex: &str) -> Result<u64, GatewayError> {
            unreachable!("hub never imports outputs")
        }

        async fn open_wallet(&self, filename: &str, _password: &str) -> Result<(), GatewayError> {
            self.record(format!("open_wallet({filename})"));
            Ok(())
        }

        async fn create_wallet_from_keys(&self, spec: &ViewWalletSpec) -> Result<(), GatewayError> {
            self.record(format!(
                "generate_from_keys({},spend={})",
                spec.filename,
                spec.spend_key.is_some()
            ));
            if self.fail_create_wallet {
                return Err(GatewayError::Application {
                    code: -21,
                    message: "wallet already exists".into(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        gateway: Arc<FakeGateway>,
        session: OperatorSession<Arc<FakeGateway>>,
        registry: Arc<OperatorRegistry>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(gateway: FakeGateway, single_tenant: bool) -> Harness {
        let dir = tempdir().unwrap();
        let gateway = Arc::new(gateway);
        let registry = Arc::new(OperatorRegistry::new(dir.path()));
        let session = OperatorSession::new(
            PeerId::from("peer-1"),
            WalletLease::new(Arc::clone(&gateway)),
            Arc::clone(&registry),
            single_tenant,
        );
        Harness {
            gateway,
            session,
            registry,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeGateway::default(), false)
    }

    fn bind_alice(registry: &OperatorRegistry) {
        registry
            .bind(
                "alice",
                WalletBinding {
                    wallet_name: "viewonly_alice_1700000000".into(),
                    address: "9xAddr".into(),
                    created_at: 1_700_000_000,
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_balance_converts_to_display_units() {
        let mut h = harness();
        bind_alice(&h.registry);

        let resp = h
            .session
            .handle(Message::BalanceRequest(BalanceRequest::new("alice")))
            .await;
        match resp {
            Message::BalanceResponse(r) => {
                assert!(r.success);
                assert_eq!(r.balance, 5.0);
                assert_eq!(r.unlocked_balance, 4.0);
                assert_eq!(r.block_height, 123_456);
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        assert_eq!(
            h.gateway.calls(),
            vec![
                "open_wallet(viewonly_alice_1700000000)",
                "refresh",
                "get_balance",
                "get_height"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_operator_is_refused_without_touching_wallet() {
        let mut h = harness();
        let resp = h
            .session
            .handle(Message::BalanceRequest(BalanceRequest::new("mallory")))
            .await;
        match resp {
            Message::BalanceResponse(r) => {
                assert!(!r.success);
                assert_eq!(r.error.as_deref(), Some("Wallet not found for operator"));
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        assert!(h.gateway.calls().is_empty());
        assert_eq!(*h.session.state(), SessionState::AwaitingFirstMessage);
    }

    #[tokio::test]
    async fn test_single_tenant_falls_back_to_open_wallet() {
        let mut h = harness_with(FakeGateway::default(), true);
        let resp = h
            .session
            .handle(Message::BalanceRequest(BalanceRequest::new("solo")))
            .await;
        match resp {
            Message::BalanceResponse(r) => assert!(r.success),
            other => panic!("wrong kind: {}", other.kind()),
        }
        // No open_wallet call: the daemon's current wallet is used as-is.
        assert_eq!(h.gateway.calls(), vec!["refresh", "get_balance", "get_height"]);
    }

    #[tokio::test]
    async fn test_repeat_requests_do_not_reopen_wallet() {
        let mut h = harness();
        bind_alice(&h.registry);

        for _ in 0..2 {
            h.session
                .handle(Message::BalanceRequest(BalanceRequest::new("alice")))
                .await;
        }
        let opens = h
            .gateway
            .calls()
            .iter()
            .filter(|c| c.starts_with("open_wallet"))
            .count();
        assert_eq!(opens, 1);
    }

    #[tokio::test]
    async fn test_create_tx_rejects_bad_priority_and_amount() {
        let mut h = harness();
        bind_alice(&h.registry);

        let resp = h
            .session
            .handle(Message::CreateTxRequest(CreateTxRequest::new(
                "alice", "9xDest", 0.5, 9,
            )))
            .await;
        match resp {
            Message::CreateTxResponse(r) => {
                assert!(!r.success);
                assert_eq!(r.error.as_deref(), Some("priority must be between 0 and 3"));
            }
            other => panic!("wrong kind: {}", other.kind()),
        }

        let resp = h
            .session
            .handle(Message::CreateTxRequest(CreateTxRequest::new(
                "alice", "9xDest", -1.0, 1,
            )))
            .await;
        match resp {
            Message::CreateTxResponse(r) => assert!(!r.success),
            other => panic!("wrong kind: {}", other.kind()),
        }
        // Neither invalid request reached the daemon.
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_tx_converts_amount_and_fee() {
        let mut h = harness();
        bind_alice(&h.registry);

        let resp = h
            .session
            .handle(Message::CreateTxRequest(CreateTxRequest::new(
                "alice", "9xDest", 0.001, 1,
            )))
            .await;
        match resp {
            Message::CreateTxResponse(r) => {
                assert!(r.success);
                assert_eq!(r.unsigned_txset, "unsigned-blob");
                assert_eq!(r.fee, 0.00002);
                assert_eq!(r.amount, 0.001);
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        assert!(h
            .gateway
            .calls()
            .contains(&"transfer(9xDest,1000000000,1)".to_string()));
    }

    #[tokio::test]
    async fn test_submit_uses_relay_fallback() {
        let mut h = harness_with(
            FakeGateway {
                fail_submit: true,
                ..Default::default()
            },
            false,
        );
        bind_alice(&h.registry);

        let resp = h
            .session
            .handle(Message::SubmitTxRequest(SubmitTxRequest::new(
                "alice",
                "signed-blob",
            )))
            .await;
        match resp {
            Message::SubmitTxResponse(r) => {
                assert!(r.success);
                assert_eq!(r.tx_hash, "hash-relay");
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        let calls = h.gateway.calls();
        assert!(calls.contains(&"submit_transfer".to_string()));
        assert!(calls.contains(&"relay_tx".to_string()));
    }

    #[tokio::test]
    async fn test_submit_surfaces_last_error_when_both_paths_fail() {
        let mut h = harness_with(
            FakeGateway {
                fail_submit: true,
                fail_relay: true,
                ..Default::default()
            },
            false,
        );
        bind_alice(&h.registry);

        let resp = h
            .session
            .handle(Message::SubmitTxRequest(SubmitTxRequest::new(
                "alice",
                "signed-blob",
            )))
            .await;
        match resp {
            Message::SubmitTxResponse(r) => {
                assert!(!r.success);
                assert_eq!(r.error.as_deref(), Some("relay rejected"));
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_import_key_images_passes_offset_through() {
        let mut h = harness();
        bind_alice(&h.registry);

        let images = vec![SignedKeyImage {
            key_image: "ki".into(),
            signature: "sig".into(),
        }];
        let resp = h
            .session
            .handle(Message::ImportKeyImagesRequest(ImportKeyImagesRequest::new(
                "alice", images, 7,
            )))
            .await;
        match resp {
            Message::ImportKeyImagesResponse(r) => {
                assert!(r.success);
                assert_eq!(r.height, 123_450);
                assert_eq!(r.spent, 1_000_000_000_000);
                assert_eq!(r.unspent, 4_000_000_000_000);
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        assert!(h
            .gateway
            .calls()
            .contains(&"import_key_images(1,7)".to_string()));
    }

    #[tokio::test]
    async fn test_provision_binds_operator_durably() {
        let mut h = harness();

        let resp = h
            .session
            .handle(Message::ProvisionWalletRequest(ProvisionWalletRequest::new(
                "alice", "deadbeef", "9xAddr", 1000,
            )))
            .await;
        let wallet_name = match resp {
            Message::ProvisionAck(a) => {
                assert!(a.success);
                assert_eq!(a.operator_id, "alice");
                a.status.unwrap()
            }
            other => panic!("wrong kind: {}", other.kind()),
        };
        assert!(wallet_name.contains("viewonly_alice_"));

        let binding = h.registry.lookup("alice").unwrap().unwrap();
        assert!(binding.wallet_name.starts_with("viewonly_alice_"));
        assert_eq!(binding.address, "9xAddr");

        // The hub-side wallet is always view-only.
        assert!(h
            .gateway
            .calls()
            .iter()
            .any(|c| c.starts_with("generate_from_keys(viewonly_alice_") && c.ends_with("spend=false)")));

        // The fresh wallet is already open; a follow-up request must not
        // call open_wallet again.
        h.session
            .handle(Message::BalanceRequest(BalanceRequest::new("alice")))
            .await;
        assert!(!h.gateway.calls().iter().any(|c| c.starts_with("open_wallet")));
    }

    #[tokio::test]
    async fn test_provision_failure_reports_daemon_error() {
        let mut h = harness_with(
            FakeGateway {
                fail_create_wallet: true,
                ..Default::default()
            },
            false,
        );
        let resp = h
            .session
            .handle(Message::ProvisionWalletRequest(ProvisionWalletRequest::new(
                "alice", "deadbeef", "9xAddr", 0,
            )))
            .await;
        match resp {
            Message::ProvisionAck(a) => {
                assert!(!a.success);
                assert_eq!(a.error.as_deref(), Some("wallet already exists"));
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
        assert_eq!(h.registry.lookup("alice").unwrap(), None);
    }

    #[tokio::test]
    async fn test_rebinding_switches_wallets() {
        let mut h = harness();
        bind_alice(&h.registry);
        h.registry
            .bind(
                "bob",
                WalletBinding {
                    wallet_name: "viewonly_bob_1700000001".into(),
                    address: "9xBob".into(),
                    created_at: 1_700_000_001,
                },
            )
            .unwrap();

        h.session
            .handle(Message::BalanceRequest(BalanceRequest::new("alice")))
            .await;
        h.session
            .handle(Message::BalanceRequest(BalanceRequest::new("bob")))
            .await;

        let opens: Vec<_> = h
            .gateway
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("open_wallet"))
            .collect();
        assert_eq!(
            opens,
            vec![
                "open_wallet(viewonly_alice_1700000000)",
                "open_wallet(viewonly_bob_1700000001)"
            ]
        );
    }

    #[tokio::test]
    async fn test_response_kind_inbound_gets_typed_error() {
        let mut h = harness();
        let id = uuid::Uuid::new_v4();
        let resp = h
            .session
            .handle(Message::BalanceResponse(BalanceResponse::ok(id, 1.0, 1.0, 1)))
            .await;
        match resp {
            Message::Error(e) => {
                assert_eq!(e.correlation_id, id);
                assert!(e.error.contains("unexpected message kind"));
            }
            other => panic!("wrong kind: {}", other.kind()),
        }
    }
}
