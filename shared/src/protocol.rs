use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::GameConfig;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Host -> Renderer ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "frame")]
    Frame(FrameMsg),
    #[serde(rename = "phase")]
    Phase(PhaseMsg),
    #[serde(rename = "score")]
    Score(ScoreMsg),
    #[serde(rename = "game_ended")]
    GameEnded(GameEndedMsg),
    #[serde(rename = "leaderboard")]
    Leaderboard(LeaderboardMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub server_version: String,
    pub config: GameConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "snake_case")]
pub enum PhaseWire {
    Menu,
    Playing,
    GameOver,
}

/// Snapshot of the simulation handed to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct FrameMsg {
    pub tick: u32,
    pub phase: PhaseWire,
    pub score: u32,
    pub time_remaining: f64,
    pub avatar: [f64; 3],
    pub souls: Vec<SoulWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SoulWire {
    pub id: u32,
    pub pos: [f64; 3],
    /// 0 while floating, decays from 1 to 0 while being collected
    pub progress: f64,
    pub scale: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PhaseMsg {
    pub phase: PhaseWire,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ScoreMsg {
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameEndedMsg {
    pub final_score: u32,
    pub souls_collected: u32,
    pub souls_spawned: u32,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardMsg {
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub top: Vec<LeaderboardEntry>,
}

// === Renderer -> Host ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "input")]
    Input { x: f64, z: f64 },
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "restart")]
    Restart,
    #[serde(rename = "return_to_menu")]
    ReturnToMenu,
    #[serde(rename = "set_name")]
    SetName { name: String },
    #[serde(rename = "set_autopilot")]
    SetAutopilot { enabled: bool },
}

// === Leaderboard service records ===

/// Body of `POST /api/scores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ScoreSubmission {
    pub name: String,
    pub score: u32,
}

/// Reply to a successful submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ScoreAccepted {
    #[serde(default)]
    pub rank: Option<u32>,
}

/// One row of `GET /api/scores?limit=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
}

// === Conversion helpers ===

/// Round to 4 decimal places (plenty for render positions, halves JSON size)
#[inline]
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

#[inline]
pub fn round4_array(v: [f64; 3]) -> [f64; 3] {
    [round4(v[0]), round4(v[1]), round4(v[2])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_carries_version_and_config() {
        let msg = ServerMsg::Welcome(WelcomeMsg {
            protocol_version: PROTOCOL_VERSION,
            server_version: "0.1.0".to_string(),
            config: GameConfig::default(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"welcome\""));
        assert!(json.contains("\"protocolVersion\":1"));
        match serde_json::from_str::<ServerMsg>(&json).unwrap() {
            ServerMsg::Welcome(w) => assert_eq!(w.config, GameConfig::default()),
            _ => panic!("Expected Welcome"),
        }
    }

    #[test]
    fn frame_uses_snake_case_phase() {
        let msg = ServerMsg::Frame(FrameMsg {
            tick: 3,
            phase: PhaseWire::GameOver,
            score: 4,
            time_remaining: 0.0,
            avatar: [0.0, 1.0, 0.0],
            souls: vec![SoulWire {
                id: 9,
                pos: [1.0, 2.0, 3.0],
                progress: 0.5,
                scale: 0.75,
                opacity: 0.5,
            }],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"frame\""));
        assert!(json.contains("\"phase\":\"game_over\""));
        assert!(json.contains("\"timeRemaining\":0.0"));
    }

    #[test]
    fn client_input_parses() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"input","x":0.5,"z":-1.0}"#).unwrap();
        match msg {
            ClientMsg::Input { x, z } => {
                assert!((x - 0.5).abs() < 1e-9);
                assert!((z + 1.0).abs() < 1e-9);
            }
            _ => panic!("Expected Input"),
        }
    }

    #[test]
    fn unit_client_messages_parse() {
        assert!(matches!(
            serde_json::from_str::<ClientMsg>(r#"{"type":"return_to_menu"}"#).unwrap(),
            ClientMsg::ReturnToMenu
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMsg>(r#"{"type":"start"}"#).unwrap(),
            ClientMsg::Start
        ));
    }

    #[test]
    fn leaderboard_msg_omits_empty_fields() {
        let msg = LeaderboardMsg {
            submitted: true,
            rank: None,
            error: None,
            top: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("rank"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn round4_trims_precision() {
        assert_eq!(round4(1.234567), 1.2346);
        assert_eq!(round4_array([0.00004, 1.0, -2.55557]), [0.0, 1.0, -2.5556]);
    }
}
