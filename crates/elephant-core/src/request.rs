use serde::{Deserialize, Serialize};

use crate::item::Item;

/// What to search for and which providers to consult.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Provider names, in client preference order. May contain the prefix
    /// form `menus:<menu_name>` to address a single named menu.
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub maxresults: i32,
    #[serde(default)]
    pub exactsearch: bool,
}

/// Runs a named action of a previously returned item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub identifier: String,
    /// Empty selects the provider's default action.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub provider: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRequest {
    #[serde(default)]
    pub provider: String,
}

/// Asks the server to synthesize a query for a named menu.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuRequest {
    #[serde(default)]
    pub menu_name: String,
}

/// Envelope for every streamed item, synchronous or asynchronous.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Server-assigned query sequence number; constant across one logical
    /// query, zero on post-activation updates.
    #[serde(default)]
    pub qid: u32,
    /// The original query string as the client sent it.
    #[serde(default)]
    pub query: String,
    pub item: Item,
}

/// Provider-level state tokens and provider-level actions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStateResponse {
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub provider: String,
}
