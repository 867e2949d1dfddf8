//! Client-side socket helpers for the CLI subcommands. All client requests
//! use the textual wire format.

use tokio::net::UnixStream;

use elephant_core::{
    ActivateRequest, MenuRequest, ProviderStateResponse, QueryRequest, QueryResponse, StateRequest,
};
use elephant_proto::{
    decode, encode, read_frame, write_request, FrameError, RequestOp, ResponseOp, WireFormat,
};

const FORMAT: WireFormat = WireFormat::Text;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("{0}")]
    Usage(String),
}

impl ClientError {
    /// 1 for transport failures, 2 for protocol violations and bad input.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Transport(_) => 1,
            Self::Protocol(_) | Self::Usage(_) => 2,
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::UnknownOpcode(op) => Self::Protocol(format!("unknown opcode {op}")),
            FrameError::Oversized(len) => Self::Protocol(format!("oversized frame ({len} bytes)")),
            other => Self::Transport(other.to_string()),
        }
    }
}

async fn connect() -> Result<UnixStream, ClientError> {
    let path = elephant_server::socket_path();
    UnixStream::connect(&path)
        .await
        .map_err(|e| ClientError::Transport(format!("{}: {e}", path.display())))
}

async fn send<T: serde::Serialize>(
    stream: &mut UnixStream,
    op: RequestOp,
    req: &T,
) -> Result<(), ClientError> {
    let payload =
        encode(FORMAT, req).map_err(|e| ClientError::Protocol(format!("encode: {e}")))?;
    write_request(stream, op, FORMAT.as_byte(), &payload)
        .await
        .map_err(ClientError::from)
}

/// `providers;query;maxresults[;exact]` with comma-separated providers.
fn parse_query_content(content: &str) -> Result<QueryRequest, ClientError> {
    let fields: Vec<&str> = content.split(';').collect();
    if fields.len() < 3 {
        return Err(ClientError::Usage(
            "expected at least 3 semicolon-separated fields: providers;query;maxresults[;exact]"
                .into(),
        ));
    }

    let providers: Vec<String> = fields[0]
        .split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if providers.is_empty() {
        return Err(ClientError::Usage("no providers specified".into()));
    }

    let maxresults: i32 = fields[2]
        .parse()
        .map_err(|_| ClientError::Usage(format!("invalid maxresults '{}'", fields[2])))?;

    let exactsearch = fields
        .get(3)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || *v == "1");

    Ok(QueryRequest {
        providers,
        query: fields[1].to_string(),
        maxresults,
        exactsearch,
    })
}

fn print_item(resp: &QueryResponse, json: bool) {
    if json {
        if let Ok(out) = serde_json::to_string(resp) {
            println!("{out}");
        }
    } else {
        let item = &resp.item;
        println!(
            "{};{};{};{};{}",
            item.score, item.provider, item.identifier, item.text, item.subtext
        );
    }
}

/// Stream one query's items to stdout. With `keep_open` the connection is
/// held after `QueryDone` so asynchronous updates keep arriving.
async fn stream_items(stream: &mut UnixStream, keep_open: bool, json: bool) -> Result<(), ClientError> {
    loop {
        let (op, payload) = match read_frame(stream).await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match op {
            ResponseOp::QueryItem | ResponseOp::QueryAsyncItem => {
                let resp: QueryResponse = decode(FORMAT, &payload)
                    .map_err(|e| ClientError::Protocol(format!("decode: {e}")))?;
                print_item(&resp, json);
            }
            ResponseOp::QueryNoResults => continue,
            ResponseOp::QueryDone => {
                if !keep_open {
                    return Ok(());
                }
            }
            other => {
                return Err(ClientError::Protocol(format!(
                    "unexpected frame {other:?} in query stream"
                )))
            }
        }
    }
}

pub async fn query(content: &str, keep_open: bool, json: bool) -> Result<(), ClientError> {
    let req = parse_query_content(content)?;
    let mut stream = connect().await?;
    send(&mut stream, RequestOp::Query, &req).await?;
    stream_items(&mut stream, keep_open, json).await
}

pub async fn menu(name: &str) -> Result<(), ClientError> {
    let mut stream = connect().await?;
    send(
        &mut stream,
        RequestOp::Menu,
        &MenuRequest {
            menu_name: name.to_string(),
        },
    )
    .await?;
    stream_items(&mut stream, false, false).await
}

pub async fn provider_state(provider: &str, json: bool) -> Result<(), ClientError> {
    let mut stream = connect().await?;
    send(
        &mut stream,
        RequestOp::State,
        &StateRequest {
            provider: provider.to_string(),
        },
    )
    .await?;

    loop {
        let (op, payload) = read_frame(&mut stream).await.map_err(ClientError::from)?;
        match op {
            ResponseOp::ProviderState => {
                let resp: ProviderStateResponse = decode(FORMAT, &payload)
                    .map_err(|e| ClientError::Protocol(format!("decode: {e}")))?;
                if json {
                    if let Ok(out) = serde_json::to_string(&resp) {
                        println!("{out}");
                    }
                } else {
                    println!("states: {}", resp.states.join(","));
                    println!("actions: {}", resp.actions.join(","));
                }
            }
            ResponseOp::StatusDone => return Ok(()),
            other => {
                return Err(ClientError::Protocol(format!(
                    "unexpected frame {other:?} in state exchange"
                )))
            }
        }
    }
}

/// `provider;identifier[;action]` — an omitted action runs the provider's
/// default.
fn parse_activate_content(content: &str) -> Result<ActivateRequest, ClientError> {
    let fields: Vec<&str> = content.split(';').collect();
    if fields.len() < 2 {
        return Err(ClientError::Usage(
            "expected provider;identifier[;action]".into(),
        ));
    }
    Ok(ActivateRequest {
        provider: fields[0].to_string(),
        identifier: fields[1].to_string(),
        action: fields.get(2).unwrap_or(&"").to_string(),
        query: String::new(),
        arguments: fields.get(3).unwrap_or(&"").to_string(),
    })
}

pub async fn activate(content: &str) -> Result<(), ClientError> {
    let req = parse_activate_content(content)?;
    let mut stream = connect().await?;
    send(&mut stream, RequestOp::Activate, &req).await?;

    loop {
        let (op, _) = read_frame(&mut stream).await.map_err(ClientError::from)?;
        match op {
            ResponseOp::ActivationFinished => return Ok(()),
            // a pending stream on a reused connection cannot happen here;
            // anything else is a protocol violation
            other => {
                return Err(ClientError::Protocol(format!(
                    "unexpected frame {other:?} while awaiting activation"
                )))
            }
        }
    }
}
