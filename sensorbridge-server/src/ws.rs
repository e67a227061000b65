use std::convert::Infallible;

use futures_util::{SinkExt, StreamExt, future::select};
use log::{debug, info};
use sensorbridge_lib::{Context, Record};
use serde::Deserialize;
use warp::{
    Filter, Rejection, Reply,
    ws::{Message as WsMsg, WebSocket},
};

/// Commands a subscriber can push back over its socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
enum Command {
    Ping,
    Send {
        #[serde(default)]
        text: String,
    },
}

/// Cloneable filter injecting the pipeline context
fn with_ctx(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// Build the WebSocket route under `/ws`
pub fn ws_routes(ctx: Context) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    // allow CORS for WS handshake
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["sec-websocket-protocol", "origin", "upgrade"]);

    warp::path("ws")
        .and(warp::ws())
        .and(with_ctx(ctx))
        .map(|ws: warp::ws::Ws, ctx| ws.on_upgrade(move |socket| handle_ws(socket, ctx)))
        .with(cors)
}

async fn handle_ws(ws: WebSocket, ctx: Context) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    // The init snapshot is queued on the channel before registration
    // completes, so it is always the client's first frame.
    let init = ctx.init_record();
    let (id, mut frames, replies) = ctx.broadcaster().register(&init);

    // Broadcast frames → client
    let outbound = async {
        while let Some(frame) = frames.recv().await {
            if ws_tx.send(WsMsg::text(frame)).await.is_err() {
                break; // client disconnected
            }
        }
    };

    // Client commands → pipeline; malformed frames are dropped.
    let inbound = async {
        while let Some(result) = ws_rx.next().await {
            if let Ok(msg) = result {
                if let Ok(txt) = msg.to_str() {
                    match serde_json::from_str::<Command>(txt) {
                        Ok(Command::Ping) => {
                            let _ = replies.send(pong_frame());
                        }
                        Ok(Command::Send { text }) => ctx.write_serial(&text),
                        Err(e) => debug!("dropping malformed command frame: {}", e),
                    }
                }
            }
        }
    };

    // Run inbound and outbound until one finishes
    select(Box::pin(inbound), Box::pin(outbound)).await;
    ctx.broadcaster().unregister(id);
    info!("WebSocket client {} disconnected", id);
}

fn pong_frame() -> String {
    serde_json::to_string(&Record::Pong).expect("pong serializes")
}
