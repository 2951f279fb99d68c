use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use uuid::Uuid;

use std::collections::HashMap;
use std::sync::Arc;

use crate::services::room_service::RoomService;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type SharedSink = Arc<Mutex<WsSink>>;
/// room code -> session id -> outbound sink
type RoomConnections = Arc<Mutex<HashMap<String, HashMap<String, SharedSink>>>>;

/// Inbound client command, discriminated by `action`. Fields beyond the
/// action are optional so one shape covers the whole protocol.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommandMessage {
    action: String,
    room_code: Option<String>,
    player_name: Option<String>,
    piece_index: Option<usize>,
    text: Option<String>,
    emoji: Option<String>,
}

pub async fn run_websocket_server(addr: &str, rooms: Arc<RoomService>) {
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind the WebSocket listener");
    log::info!("Ludo WebSocket server listening on {}", addr);

    let connections: RoomConnections = Arc::new(Mutex::new(HashMap::new()));

    while let Ok((stream, _)) = listener.accept().await {
        let rooms = rooms.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            handle_connection(stream, rooms, connections).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, rooms: Arc<RoomService>, connections: RoomConnections) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("WebSocket handshake failed: {:?}", e);
            return;
        }
    };

    let (write, mut read) = ws_stream.split();
    let sink: SharedSink = Arc::new(Mutex::new(write));
    let session_id = Uuid::new_v4().to_string();
    let mut joined_room: Option<String> = None;
    log::info!("User connected: {}", session_id);

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<CommandMessage>(&text) {
                Ok(command) => {
                    handle_command(command, &session_id, &mut joined_room, &rooms, &connections, &sink)
                        .await;
                }
                Err(e) => {
                    log::warn!("Unparseable message from {}: {}", session_id, e);
                    send_error(&sink, "Invalid message format").await;
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = sink.lock().await.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                log::warn!("Connection error for {}: {:?}", session_id, e);
                break;
            }
            _ => {}
        }
    }

    if let Some(code) = joined_room {
        leave_room(&rooms, &connections, &code, &session_id).await;
    }
    log::info!("User disconnected: {}", session_id);
}

async fn handle_command(
    command: CommandMessage,
    session_id: &str,
    joined_room: &mut Option<String>,
    rooms: &Arc<RoomService>,
    connections: &RoomConnections,
    sink: &SharedSink,
) {
    match command.action.as_str() {
        "create_room" => {
            let Some(name) = command.player_name else {
                return send_error(sink, "Player name is required").await;
            };
            let code = rooms.create_room().await;
            let created = rooms
                .with_game(&code, |game| {
                    game.add_player(session_id, name.as_str())?;
                    Ok(json!({ "action": "room_created", "roomCode": code, "game": &*game }))
                })
                .await;
            match created {
                Ok(payload) => {
                    if let Some(previous) = joined_room.take() {
                        leave_room(rooms, connections, &previous, session_id).await;
                    }
                    join_connection(connections, &code, session_id, sink).await;
                    *joined_room = Some(code.clone());
                    send_json(sink, &payload).await;
                    log::info!("Room created: {} by {}", code, name);
                }
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "join_room" => {
            let (Some(code), Some(name)) = (command.room_code, command.player_name) else {
                return send_error(sink, "Room code and player name are required").await;
            };
            if joined_room.as_deref() == Some(code.as_str()) {
                return send_error(sink, "Already in this room").await;
            }
            let joined = rooms
                .with_game(&code, |game| {
                    game.add_player(session_id, name.as_str())?;
                    Ok(json!({ "action": "player_joined", "game": &*game }))
                })
                .await;
            match joined {
                Ok(payload) => {
                    if let Some(previous) = joined_room.take() {
                        leave_room(rooms, connections, &previous, session_id).await;
                    }
                    join_connection(connections, &code, session_id, sink).await;
                    *joined_room = Some(code.clone());
                    broadcast(connections, &code, &payload).await;
                    log::info!("Player {} joined room: {}", name, code);
                }
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "start_game" => {
            let Some(code) = command.room_code else {
                return send_error(sink, "Room code is required").await;
            };
            let started = rooms
                .with_game(&code, |game| {
                    game.start_game()?;
                    Ok(json!({ "action": "game_started", "game": &*game }))
                })
                .await;
            match started {
                Ok(payload) => {
                    broadcast(connections, &code, &payload).await;
                    log::info!("Game started in room: {}", code);
                }
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "roll_dice" => {
            let Some(code) = command.room_code else {
                return send_error(sink, "Room code is required").await;
            };
            let rolled = rooms
                .with_game(&code, |game| {
                    let outcome = game.roll_dice()?;
                    Ok(json!({
                        "action": "dice_rolled",
                        "roll": outcome.roll,
                        "movablePieces": outcome.movable_pieces,
                        "autoMoved": outcome.auto_moved,
                        "turnAdvanced": outcome.turn_advanced,
                        "game": &*game,
                    }))
                })
                .await;
            match rolled {
                Ok(payload) => {
                    log::info!("Dice rolled: {} in room {}", payload["roll"], code);
                    broadcast(connections, &code, &payload).await;
                }
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "move_piece" => {
            let (Some(code), Some(piece_index)) = (command.room_code, command.piece_index) else {
                return send_error(sink, "Room code and piece index are required").await;
            };
            let moved = rooms
                .with_game(&code, |game| {
                    let outcome = game.move_piece(session_id, piece_index)?;
                    Ok(json!({ "action": "piece_moved", "move": outcome, "game": &*game }))
                })
                .await;
            match moved {
                Ok(payload) => {
                    log::info!("Piece moved: {} in room {}", piece_index, code);
                    broadcast(connections, &code, &payload).await;
                }
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "send_message" => {
            let (Some(code), Some(text)) = (command.room_code, command.text) else {
                return send_error(sink, "Room code and message text are required").await;
            };
            let name = command.player_name.unwrap_or_else(|| "Unknown".to_string());
            let sent = rooms
                .with_game(&code, |game| {
                    let message = game.send_message(session_id, name.as_str(), text.as_str());
                    Ok(json!({ "action": "new_message", "message": message }))
                })
                .await;
            match sent {
                Ok(payload) => broadcast(connections, &code, &payload).await,
                Err(err) => send_error(sink, &err.to_string()).await,
            }
        }
        "send_emoji" => {
            // Fire-and-forget relay, nothing touches the game state.
            let (Some(code), Some(emoji)) = (command.room_code, command.emoji) else {
                return;
            };
            let payload = json!({ "action": "emoji_received", "emoji": emoji, "playerId": session_id });
            broadcast(connections, &code, &payload).await;
        }
        other => log::debug!("Ignoring unknown action: {}", other),
    }
}

/// Takes a session out of a room: drops its sink, removes its player, tells
/// the remaining members, and deletes the room once empty. Used both on
/// disconnect and when a session moves to another room.
async fn leave_room(rooms: &RoomService, connections: &RoomConnections, code: &str, session_id: &str) {
    leave_connection(connections, code, session_id).await;
    let left = rooms
        .with_game(code, |game| {
            game.remove_player(session_id);
            Ok(json!({ "action": "player_left", "playerId": session_id, "game": &*game }))
        })
        .await;
    if let Ok(payload) = left {
        broadcast(connections, code, &payload).await;
    }
    rooms.delete_if_empty(code).await;
}

async fn join_connection(connections: &RoomConnections, room: &str, session_id: &str, sink: &SharedSink) {
    connections
        .lock()
        .await
        .entry(room.to_string())
        .or_default()
        .insert(session_id.to_string(), sink.clone());
}

async fn leave_connection(connections: &RoomConnections, room: &str, session_id: &str) {
    let mut connections = connections.lock().await;
    if let Some(peers) = connections.get_mut(room) {
        peers.remove(session_id);
        if peers.is_empty() {
            connections.remove(room);
        }
    }
}

/// Delivers a payload to every session joined to the room.
async fn broadcast(connections: &RoomConnections, room: &str, payload: &serde_json::Value) {
    let peers: Vec<SharedSink> = connections
        .lock()
        .await
        .get(room)
        .map(|peers| peers.values().cloned().collect())
        .unwrap_or_default();
    let frame = payload.to_string();
    for peer in peers {
        if let Err(e) = peer.lock().await.send(Message::Text(frame.clone())).await {
            log::warn!("Failed to deliver a message in room {}: {:?}", room, e);
        }
    }
}

async fn send_json(sink: &SharedSink, payload: &serde_json::Value) {
    if let Err(e) = sink.lock().await.send(Message::Text(payload.to_string())).await {
        log::warn!("Failed to send a message: {:?}", e);
    }
}

/// Errors go back to the originating session only.
async fn send_error(sink: &SharedSink, message: &str) {
    send_json(sink, &json!({ "action": "error", "message": message })).await;
}
