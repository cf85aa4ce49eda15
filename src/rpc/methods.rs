//! RPC Method Implementations
//!
//! Each method corresponds to a JSON-RPC call that external apps can make.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::constants::CHAIN_NAME;
use crate::crypto::{PublicKey, SchnorrSignature};
use crate::node::{Node, NodeError};

/// Method not found
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Malformed parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Ledger cannot be rebuilt from local history
pub const REPLAY_INCOMPLETE: i32 = -8;
/// Transaction refused
pub const TRANSACTION_REJECTED: i32 = -26;
/// Unknown block
pub const BLOCK_NOT_FOUND: i32 = -5;
/// Anything else
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC Error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// RPC Handler State
pub type RpcState = Arc<Node>;

/// Process a JSON-RPC request and return a response
pub fn handle_request(node: &Node, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id;
    let params = positional(request.params);

    match request.method.as_str() {
        "sendtransaction" => send_transaction(node, id, &params),
        "getledger" => get_ledger(node, id),
        "getbalance" => get_balance(node, id, &params),
        "getpeers" => get_peers(node, id),
        "getinfo" => get_info(node, id),
        "getblock" => get_block(node, id, &params),
        _ => JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

/// Accept `[a, b]`, a bare scalar, or nothing
fn positional(params: Option<Value>) -> Vec<Value> {
    match params {
        Some(Value::Array(values)) => values,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

fn node_error(id: Value, error: NodeError) -> JsonRpcResponse {
    let code = match &error {
        NodeError::Replay(_) => REPLAY_INCOMPLETE,
        NodeError::Transaction(_) => TRANSACTION_REJECTED,
        _ => INTERNAL_ERROR,
    };
    JsonRpcResponse::error(id, code, error.to_string())
}

fn account_param(params: &[Value], index: usize) -> Option<PublicKey> {
    params.get(index)?.as_str()?.parse().ok()
}

/// Submit a transfer from this node's account
/// Params: [to_account, amount]
fn send_transaction(node: &Node, id: Value, params: &[Value]) -> JsonRpcResponse {
    let Some(to) = account_param(params, 0) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: [to_account, amount]".into());
    };
    let Some(amount) = params.get(1).and_then(Value::as_u64) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: amount must be a positive integer".into());
    };

    match node.submit_transaction(to, amount) {
        Ok(tx_id) => JsonRpcResponse::success(id, json!(tx_id)),
        Err(e) => node_error(id, e),
    }
}

/// Balances of every account on the canonical chain
fn get_ledger(node: &Node, id: Value) -> JsonRpcResponse {
    match node.current_ledger_snapshot() {
        Ok(ledger) => JsonRpcResponse::success(id, json!(ledger)),
        Err(e) => node_error(id, e),
    }
}

/// Balance of one account
/// Params: [account]
fn get_balance(node: &Node, id: Value, params: &[Value]) -> JsonRpcResponse {
    let Some(account) = account_param(params, 0) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected account".into());
    };

    match node.balance(&account) {
        Ok(balance) => JsonRpcResponse::success(id, json!(balance)),
        Err(e) => node_error(id, e),
    }
}

/// Known peers
fn get_peers(node: &Node, id: Value) -> JsonRpcResponse {
    JsonRpcResponse::success(id, json!(node.list_peers()))
}

/// Returns general node information
fn get_info(node: &Node, id: Value) -> JsonRpcResponse {
    let mut info = json!(node.info());
    info["chain"] = json!(CHAIN_NAME);
    info["version"] = json!(env!("CARGO_PKG_VERSION"));
    JsonRpcResponse::success(id, info)
}

/// Returns a stored block by signature
/// Params: [signature_hex]
fn get_block(node: &Node, id: Value, params: &[Value]) -> JsonRpcResponse {
    let signature = params
        .first()
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<SchnorrSignature>().ok());
    let Some(signature) = signature else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Invalid params: expected block signature".into());
    };

    match node.block(&signature) {
        Some(block) => JsonRpcResponse::success(id, json!(block)),
        None => JsonRpcResponse::error(id, BLOCK_NOT_FOUND, "Block not found".into()),
    }
}
