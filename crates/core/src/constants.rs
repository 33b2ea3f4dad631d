//! Event types, attribute keys and counter names.
//!
//! These mirror what Cosmos-SDK, CometBFT and the rollup VM modules emit.

/// Cosmos `tx` event carrying the `fee` attribute.
pub const EVENT_TYPE_TX: &str = "tx";

/// Cosmos `message` event carrying the `sender` attribute.
pub const EVENT_TYPE_MESSAGE: &str = "message";

/// Event type of EVM logs (`log` attribute holds the JSON log).
pub const EVENT_TYPE_EVM: &str = "evm";

/// Event type of Move events (`type_tag` + `data` attributes).
pub const EVENT_TYPE_MOVE: &str = "move";

/// Event type of CosmWasm contract responses.
pub const EVENT_TYPE_WASM: &str = "wasm";

/// Fee attribute key on the `tx` event.
pub const ATTR_FEE: &str = "fee";

/// Sender attribute key on the `message` event.
pub const ATTR_SENDER: &str = "sender";

/// Attribute CometBFT 0.38 attaches to finalize-block events.
pub const ATTR_MODE: &str = "mode";

/// `mode` value of pre-block events.
pub const MODE_PRE_BLOCK: &str = "PreBlock";

/// `mode` value of begin-block events.
pub const MODE_BEGIN_BLOCK: &str = "BeginBlock";

/// `mode` value of end-block events.
pub const MODE_END_BLOCK: &str = "EndBlock";

/// Counter backing `txs.sequence`.
pub const SEQ_TX: &str = "tx";

/// Counter backing `account_txs.sequence`.
pub const SEQ_ACCOUNT_TX: &str = "account_tx";
