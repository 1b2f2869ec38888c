//! RPC transport against a mocked driver endpoint
//!
//! Checks verb routing, payload shape, that handles are released on both
//! success and failure, and that RPC and REST report driver answers alike.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcplane::control::VmStatus;
use mcplane::driver::rest::RestTransport;
use mcplane::driver::rpc::RpcTransport;
use mcplane::driver::types::KeyPairReqInfo;
use mcplane::driver::{DriverClient, DriverError, DriverRequest, DriverTransport, Operation};
use mcplane::resource::mcis::{McisRecord, VmRecord};
use mcplane::store::{self, keys, MemoryStore};
use mcplane::{ControlPlane, Error};

fn rpc_config(server: &MockServer) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "driver:").unwrap();
    writeln!(file, "  server_address: {}", server.uri()).unwrap();
    writeln!(file, "  timeout_secs: 5").unwrap();
    file
}

#[tokio::test]
async fn test_create_key_uses_verb_and_releases_handle() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/CreateKey"))
        .and(body_json(json!({
            "ConnectionName": "gcp-asia-east1",
            "ReqInfo": {"Name": "ns01-key01"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "IId": {"NameId": "ns01-key01", "SystemId": "projects/p/keys/k1"},
            "PublicKey": "ssh-rsa AAAA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = rpc_config(&server);
    let transport = Arc::new(RpcTransport::new(config.path()));
    let client = DriverClient::new(transport.clone());

    let req = KeyPairReqInfo {
        name: "ns01-key01".into(),
        csp_id: String::new(),
    };
    let info = assert_ok!(client.create_key_pair("gcp-asia-east1", &req).await);
    assert_eq!(info.iid.system_id, "projects/p/keys/k1");
    assert_eq!(transport.open_handles(), 0);
}

#[tokio::test]
async fn test_get_vm_status_sends_name_in_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/GetVMStatus"))
        .and(body_json(json!({"ConnectionName": "conn", "Name": "ns01-mcis01-vm01"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "Suspended"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = rpc_config(&server);
    let client = DriverClient::new(Arc::new(RpcTransport::new(config.path())));

    let status = assert_ok!(client.get_vm_status("conn", "ns01-mcis01-vm01").await);
    assert_eq!(status.status, "Suspended");
}

#[tokio::test]
async fn test_rpc_failure_carries_status_and_handle_released() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/TerminateVM"))
        .respond_with(ResponseTemplate::new(500).set_body_string("vm not found"))
        .mount(&server)
        .await;

    let config = rpc_config(&server);
    let transport = Arc::new(RpcTransport::new(config.path()));
    let client = DriverClient::new(transport.clone());

    let err = assert_err!(client.terminate_vm("conn", "vm01").await);
    match err {
        Error::Driver { operation, connection, source } => {
            assert_eq!(operation, "TerminateVM");
            assert_eq!(connection, "conn");
            assert!(matches!(source, DriverError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.open_handles(), 0);
}

#[tokio::test]
async fn test_redirect_reply_is_accepted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc/GetVMStatus"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let config = rpc_config(&server);
    let transport = RpcTransport::new(config.path());
    let req = DriverRequest::new(Operation::GetVmStatus, "conn").with_target("vm01");
    assert_eq!(assert_ok!(transport.invoke(&req).await), Value::Null);
}

mod transport_parity {
    use super::*;

    fn seeded_plane(transport: Arc<dyn DriverTransport>) -> (ControlPlane, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store::put_json(
            store.as_ref(),
            &keys::mcis_key("ns01", "mcis01"),
            &McisRecord {
                id: "mcis01".into(),
                name: "mcis01".into(),
                ..Default::default()
            },
        )
        .unwrap();
        store::put_json(
            store.as_ref(),
            &keys::vm_key("ns01", "mcis01", "vm01"),
            &VmRecord {
                id: "vm01".into(),
                name: "vm01".into(),
                connection_name: "conn".into(),
                csp_vm_name: "ns01-mcis01-vm01".into(),
                status: VmStatus::Running,
                ..Default::default()
            },
        )
        .unwrap();

        let plane = ControlPlane::new(store.clone(), DriverClient::new(transport));
        (plane, store)
    }

    async fn refine_missing_vm(transport: Arc<dyn DriverTransport>) -> (usize, usize, String) {
        let (plane, store) = seeded_plane(transport);
        let outcome = plane
            .control("ns01", "mcis01", None, "refine", false)
            .await
            .into_result()
            .unwrap();

        let removed = outcome.members.iter().filter(|m| m.removed).count();
        let left: Vec<VmRecord> =
            store::list_json(store.as_ref(), &keys::vm_prefix("ns01", "mcis01")).unwrap();
        (removed, left.len(), outcome.message)
    }

    #[tokio::test]
    async fn test_refine_removes_missing_vm_over_both_transports() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spider/vmstatus/ns01-mcis01-vm01"))
            .respond_with(ResponseTemplate::new(404).set_body_string("vm not found"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc/GetVMStatus"))
            .respond_with(ResponseTemplate::new(404).set_body_string("vm not found"))
            .expect(1)
            .mount(&server)
            .await;

        let rest = RestTransport::new(&format!("{}/spider", server.uri()), Duration::from_secs(5)).unwrap();
        let config = rpc_config(&server);
        let rpc = RpcTransport::new(config.path());

        let over_rest = refine_missing_vm(Arc::new(rest)).await;
        let over_rpc = refine_missing_vm(Arc::new(rpc)).await;

        assert_eq!(over_rest.0, 1);
        assert_eq!(over_rest.1, 0);
        assert_eq!(over_rpc, over_rest);
    }
}
