use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::board::{self, Color, BASE, CAPTURE_LAST, COLORS, ENTRY, HOME};
use crate::models::chat::ChatMessage;

pub const MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS: usize = 2;
/// Roll needed to bring a piece out of its base, and the roll that earns
/// another turn.
pub const ENTRY_ROLL: u8 = 6;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameError {
    #[error("Room is full")]
    RoomFull,
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Game not started")]
    GameNotStarted,
    #[error("You have already rolled")]
    AlreadyRolled,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Need at least 2 players")]
    InsufficientPlayers,
    #[error("That piece cannot be moved")]
    IllegalMove,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub color: Color,
    /// Track positions of the four pieces, from base (-1) to home (57).
    pub pieces: [i8; 4],
    /// Lobby readiness flag; not consulted by the engine.
    pub is_ready: bool,
}

impl Player {
    fn new(id: String, name: String, color: Color) -> Self {
        Player {
            id,
            name,
            color,
            pieces: [BASE; 4],
            is_ready: false,
        }
    }

    pub fn has_won(&self) -> bool {
        self.pieces.iter().all(|&pos| pos == HOME)
    }
}

/// Result of a resolved `move_piece`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub piece_index: usize,
    pub from: i8,
    pub to: i8,
    /// At least one opposing piece was sent back to base.
    pub killed: bool,
    pub bonus_turn: bool,
    pub turn_advanced: bool,
    pub finished: bool,
}

/// Result of `roll_dice`, including any move it forced.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RollOutcome {
    pub roll: u8,
    /// Piece indices the current player may legally move with this roll.
    pub movable_pieces: Vec<usize>,
    /// Set when exactly one move was legal and was applied immediately.
    pub auto_moved: Option<MoveOutcome>,
    pub turn_advanced: bool,
}

/// One room's game state. All mutation goes through the methods below; every
/// operation either returns a payload or a `GameError` and never panics.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub room_id: String,
    /// Insertion order is turn order and never reshuffled.
    pub players: Vec<Player>,
    pub status: GameStatus,
    pub current_turn_index: usize,
    /// 0 when no roll is pending, otherwise the roll awaiting its move.
    pub last_dice_roll: u8,
    pub winner: Option<Player>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip)]
    rng: StdRng,
}

impl Game {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self::with_rng(room_id, StdRng::from_entropy())
    }

    /// Seeded construction for deterministic dice in tests.
    pub fn with_rng(room_id: impl Into<String>, rng: StdRng) -> Self {
        Game {
            room_id: room_id.into(),
            players: Vec::new(),
            status: GameStatus::Waiting,
            current_turn_index: 0,
            last_dice_roll: 0,
            winner: None,
            messages: Vec::new(),
            rng,
        }
    }

    fn current_player(&self) -> Result<&Player, GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::GameNotStarted);
        }
        self.players
            .get(self.current_turn_index)
            .ok_or(GameError::GameNotStarted)
    }

    /// Appends a player while the lobby is open, assigning the first color
    /// not already taken. Leaves the roster untouched on failure.
    pub fn add_player(&mut self, id: impl Into<String>, name: impl Into<String>) -> Result<Player, GameError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        if self.status != GameStatus::Waiting {
            return Err(GameError::GameAlreadyStarted);
        }
        let color = COLORS
            .into_iter()
            .find(|c| self.players.iter().all(|p| p.color != *c))
            .ok_or(GameError::RoomFull)?;
        let player = Player::new(id.into(), name.into(), color);
        self.players.push(player.clone());
        Ok(player)
    }

    /// Removes a player in any state, repairing the turn index so play can
    /// continue among whoever is left. Colors are not reassigned.
    pub fn remove_player(&mut self, id: &str) {
        let Some(index) = self.players.iter().position(|p| p.id == id) else {
            return;
        };
        let was_turn_holder = index == self.current_turn_index;
        self.players.remove(index);
        if self.players.is_empty() {
            self.current_turn_index = 0;
            self.last_dice_roll = 0;
            return;
        }
        if index < self.current_turn_index {
            self.current_turn_index -= 1;
        } else if was_turn_holder {
            // The turn falls to the next seat; a roll the leaver was holding
            // dies with them.
            self.current_turn_index %= self.players.len();
            self.last_dice_roll = 0;
        }
    }

    pub fn start_game(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.players.len() < MIN_PLAYERS {
            return Err(GameError::InsufficientPlayers);
        }
        self.status = GameStatus::Playing;
        self.current_turn_index = 0;
        self.last_dice_roll = 0;
        Ok(())
    }

    /// Piece indices `player` may move with `roll`: a based piece enters on a
    /// six, a board piece must not overshoot home.
    pub fn movable_pieces(player: &Player, roll: u8) -> Vec<usize> {
        player
            .pieces
            .iter()
            .enumerate()
            .filter(|(_, &pos)| {
                if pos == BASE {
                    roll == ENTRY_ROLL
                } else {
                    pos + roll as i8 <= HOME
                }
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Draws the die and resolves the roll. A single legal move is applied
    /// immediately; no legal move passes the turn; otherwise the roll waits
    /// for an explicit `move_piece`.
    pub fn roll_dice(&mut self) -> Result<RollOutcome, GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::GameNotStarted);
        }
        if self.last_dice_roll != 0 {
            return Err(GameError::AlreadyRolled);
        }
        let roll = self.rng.gen_range(1..=ENTRY_ROLL);
        self.resolve_roll(roll)
    }

    fn resolve_roll(&mut self, roll: u8) -> Result<RollOutcome, GameError> {
        let current = self.current_player()?;
        let player_id = current.id.clone();
        let movable_pieces = Self::movable_pieces(current, roll);
        self.last_dice_roll = roll;
        match movable_pieces.as_slice() {
            [] => {
                // Nothing to move: the roll is spent, sixes included.
                self.advance_turn();
                Ok(RollOutcome {
                    roll,
                    movable_pieces,
                    auto_moved: None,
                    turn_advanced: true,
                })
            }
            [only] => {
                let outcome = self.move_piece(&player_id, *only)?;
                let turn_advanced = outcome.turn_advanced;
                Ok(RollOutcome {
                    roll,
                    movable_pieces,
                    auto_moved: Some(outcome),
                    turn_advanced,
                })
            }
            _ => Ok(RollOutcome {
                roll,
                movable_pieces,
                auto_moved: None,
                turn_advanced: false,
            }),
        }
    }

    /// Applies the pending roll to one of the turn holder's pieces. The
    /// legality of the chosen piece is re-checked here rather than trusting
    /// the set reported by `roll_dice`.
    pub fn move_piece(&mut self, player_id: &str, piece_index: usize) -> Result<MoveOutcome, GameError> {
        let current = self.current_player()?;
        if current.id != player_id {
            return Err(GameError::NotYourTurn);
        }
        let roll = self.last_dice_roll;
        if roll == 0 || !Self::movable_pieces(current, roll).contains(&piece_index) {
            return Err(GameError::IllegalMove);
        }

        let mover = self.current_turn_index;
        let color = self.players[mover].color;
        let from = self.players[mover].pieces[piece_index];
        let to = if from == BASE { ENTRY } else { from + roll as i8 };
        self.players[mover].pieces[piece_index] = to;

        let mut killed = false;
        if (ENTRY..=CAPTURE_LAST).contains(&to) {
            let cell = board::global_position(color, to);
            if !board::is_safe_cell(cell) {
                for (index, player) in self.players.iter_mut().enumerate() {
                    if index == mover {
                        continue;
                    }
                    for pos in player.pieces.iter_mut() {
                        if (ENTRY..=CAPTURE_LAST).contains(pos)
                            && board::global_position(player.color, *pos) == cell
                        {
                            *pos = BASE;
                            killed = true;
                        }
                    }
                }
            }
        }

        if to == HOME && self.players[mover].has_won() {
            self.status = GameStatus::Finished;
            self.winner = Some(self.players[mover].clone());
            self.last_dice_roll = 0;
            return Ok(MoveOutcome {
                piece_index,
                from,
                to,
                killed,
                bonus_turn: false,
                turn_advanced: false,
                finished: true,
            });
        }

        let bonus_turn = roll == ENTRY_ROLL || killed;
        if bonus_turn {
            self.last_dice_roll = 0;
        } else {
            self.advance_turn();
        }
        Ok(MoveOutcome {
            piece_index,
            from,
            to,
            killed,
            bonus_turn,
            turn_advanced: !bonus_turn,
            finished: false,
        })
    }

    pub fn send_message(
        &mut self,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> ChatMessage {
        let message = ChatMessage::new(sender_id, sender_name, text);
        self.messages.push(message.clone());
        message
    }

    fn advance_turn(&mut self) {
        self.last_dice_roll = 0;
        if !self.players.is_empty() {
            self.current_turn_index = (self.current_turn_index + 1) % self.players.len();
        }
    }
}
