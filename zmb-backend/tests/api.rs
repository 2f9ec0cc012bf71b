//! Facade router tests against fake chain clients.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use miden_objects::{account::AccountId, Word};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use zmb_backend::{app_router, AppState};
use zmb_common::{ScanCursor, Secret};
use zmb_miden::{ExitNote, MidenError, MidenRollup};
use zmb_store::BridgeStore;
use zmb_zcash::{ConfirmedTx, PoolBalance, ZcashChain, ZcashError};

const BODY_LIMIT: usize = usize::MAX;
const SECRET_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000001";

struct FakeZcash;

#[async_trait]
impl ZcashChain for FakeZcash {
    async fn current_tip(&self) -> Result<u32, ZcashError> {
        Ok(0)
    }

    async fn scan_from(&self, _cursor: ScanCursor) -> Result<Vec<ConfirmedTx>, ZcashError> {
        Ok(vec![])
    }

    async fn send_shielded(
        &self,
        _dest_address: &str,
        _amount_base: u64,
        _memo: Option<&str>,
    ) -> Result<String, ZcashError> {
        Err(ZcashError::NodeUnavailable("fake".into()))
    }

    async fn balance(&self) -> Result<PoolBalance, ZcashError> {
        Ok(PoolBalance::default())
    }
}

struct FakeMiden {
    pool_balance: u64,
}

#[async_trait]
impl MidenRollup for FakeMiden {
    async fn sync(&self) -> Result<(), MidenError> {
        Ok(())
    }

    async fn mint_p2idh(
        &self,
        _recipient_hash: Word,
        _amount_base: u64,
    ) -> Result<String, MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }

    async fn list_consumable_exit_notes(&self) -> Result<Vec<ExitNote>, MidenError> {
        Ok(vec![])
    }

    async fn consume_note(&self, _note_id: &str) -> Result<String, MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }

    async fn vault_balance(&self, _account_id: AccountId) -> Result<u64, MidenError> {
        Ok(0)
    }

    async fn bridge_balance(&self) -> Result<u64, MidenError> {
        Ok(self.pool_balance)
    }

    async fn claim_deposit_note(
        &self,
        _account_id: AccountId,
        _secret: &Secret,
        _amount_base: u64,
    ) -> Result<(String, String), MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }

    async fn create_account(&self) -> Result<AccountId, MidenError> {
        Err(MidenError::Client("not supported by fake".into()))
    }
}

fn test_app() -> (axum::Router, Arc<BridgeStore>) {
    let store = Arc::new(BridgeStore::in_memory().unwrap());
    let state = AppState {
        store: store.clone(),
        zcash: Arc::new(FakeZcash),
        miden: Arc::new(FakeMiden {
            pool_balance: 123_450_000,
        }),
    };
    (app_router(state), store)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_responds() {
    let (app, _) = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deposit_hash_requires_parameters() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/deposit/hash")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error_code"], "MALFORMED_ACCOUNT_ID");
}

#[tokio::test]
async fn deposit_hash_rejects_short_secret() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/deposit/hash?account_id=mtst1whatever&secret=0xdead")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await;
    assert_eq!(payload["error_code"], "MALFORMED_SECRET");
}

#[tokio::test]
async fn deposit_hash_rejects_bad_account_id() {
    let (app, _) = test_app();
    let uri = format!("/deposit/hash?account_id=not-an-account&secret={SECRET_HEX}");
    let response = app
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error_code"], "MALFORMED_ACCOUNT_ID");
}

#[tokio::test]
async fn account_balance_rejects_bad_account_id() {
    let (app, _) = test_app();
    let request_body = json!({ "account_id": "garbage" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/account/balance")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pool_balance_reports_wrapped_reserve() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pool/balance")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["balance_base"], 123_450_000u64 as i64);
    assert_eq!(payload["balance"], "1.2345");
}

#[tokio::test]
async fn withdrawal_create_records_open_row() {
    let (app, store) = test_app();
    let request_body = json!({
        "account_id": "mtst1user",
        "zcash_address": "utest1dest",
        "amount": 50_000_000u64,
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/withdrawal/create")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], true);

    let pending = store.pending_withdrawals().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].dest_address, "utest1dest");
    assert_eq!(pending[0].amount_base, 50_000_000);
    assert_eq!(
        payload["transaction_id"].as_str().unwrap(),
        pending[0].id.to_string()
    );
}

#[tokio::test]
async fn withdrawal_create_rejects_zero_amount() {
    let (app, _) = test_app();
    let request_body = json!({
        "zcash_address": "utest1dest",
        "amount": 0u64,
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/withdrawal/create")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await;
    assert_eq!(payload["error_code"], "INVALID_AMOUNT");
}

#[tokio::test]
async fn operator_quarantine_starts_empty() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/operator/quarantine")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["quarantined"].as_array().unwrap().len(), 0);
    assert_eq!(payload["unclaimable"].as_array().unwrap().len(), 0);
}
