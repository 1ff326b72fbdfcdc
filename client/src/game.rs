//! Client-side session: the local world copy and its connection state
//!
//! The session only changes in response to decoded server messages and to
//! the local tick loop. It never touches the network itself, which keeps it
//! testable without sockets.

use log::{debug, info, warn};
use shared::{ship_spawn, Action, EntityId, NetError, ServerMessage, World};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// CONNECT sent, waiting for the first FULL_UPDATE
    Connecting,
    Synchronized,
}

/// What one call to [`Session::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    /// Too far ahead of the server; the clock was held back
    Stalled,
    Paused,
    /// Not synchronized, nothing to simulate
    Idle,
}

pub struct Session {
    state: SessionState,
    world: World,
    name: String,
    local_id: Option<EntityId>,
    lookahead: u64,
    max_clock_drift: u64,
    /// Latest tick heard from the server; written from the receive loop too
    server_tick: Arc<AtomicU64>,
}

impl Session {
    pub fn new(name: impl Into<String>, lookahead: u64, max_clock_drift: u64) -> Self {
        Self {
            state: SessionState::Disconnected,
            world: World::new(),
            name: name.into(),
            local_id: None,
            lookahead,
            max_clock_drift,
            server_tick: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_id(&self) -> Option<EntityId> {
        self.local_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for the receive loop to record server clock reports
    pub fn server_tick(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.server_tick)
    }

    pub fn begin_connect(&mut self) {
        self.state = SessionState::Connecting;
        self.local_id = None;
        self.server_tick.store(0, Ordering::Release);
        info!("Connecting as '{}'", self.name);
    }

    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            info!("Session closed");
        }
        self.state = SessionState::Disconnected;
        self.local_id = None;
    }

    /// Applies one server message to the local state
    ///
    /// Messages referring to entities that no longer exist yield
    /// [`NetError::UnknownPeer`]; the session is left untouched and stays
    /// usable.
    pub fn apply(&mut self, message: ServerMessage) -> Result<(), NetError> {
        match message {
            ServerMessage::FullUpdate {
                snapshot,
                assigned_id,
            } => {
                if self.state == SessionState::Disconnected {
                    debug!("FULL_UPDATE ignored while disconnected");
                    return Ok(());
                }
                let tick = snapshot.tick;
                self.world.restore(snapshot);
                self.server_tick.fetch_max(tick, Ordering::AcqRel);

                let registry = self.world.registry();
                if !registry.contains(assigned_id) {
                    registry.add(ship_spawn(assigned_id, self.name.as_str()));
                }
                self.local_id = Some(assigned_id);
                self.state = SessionState::Synchronized;
                info!("Synchronized at tick {} as ship {}", tick, assigned_id);
            }
            ServerMessage::ServerQuitting => {
                info!("Host left the game");
                self.disconnect();
            }
            ServerMessage::Clock { tick } => {
                self.server_tick.fetch_max(tick, Ordering::AcqRel);
            }
            _ if self.state != SessionState::Synchronized => {
                debug!("{:?} ignored before synchronization", message);
            }
            ServerMessage::PlayerJoined { entity } => {
                info!("Entity {} joined", entity.id());
                self.world.registry().add(entity);
            }
            ServerMessage::PlayerQuit { id } => {
                self.world
                    .registry()
                    .remove(id)
                    .ok_or(NetError::UnknownPeer(id))?;
                info!("Entity {} left", id);
                if self.local_id == Some(id) {
                    warn!("Our ship was removed by the server");
                }
            }
            ServerMessage::PlayerUpdatePosition { id, x, y, dx, dy } => {
                self.world
                    .registry()
                    .update(id, |entity| entity.body_mut().set_motion(x, y, dx, dy))
                    .ok_or(NetError::UnknownPeer(id))?;
            }
            ServerMessage::Pause { paused } => self.world.set_paused(paused),
            ServerMessage::Action { action } => {
                // Late actions are reported by the scheduler itself.
                let _ = self.world.scheduler().schedule(action);
            }
        }
        Ok(())
    }

    /// Schedules local input for the local ship
    ///
    /// Returns the action when it should also be sent upstream.
    pub fn input(&self, code: i32) -> Option<Action> {
        if self.state != SessionState::Synchronized {
            return None;
        }
        let actor = self.local_id?;
        self.world.schedule_input(actor, code, self.lookahead).ok()
    }

    /// Whether the local clock may advance
    pub fn admitted(&self) -> bool {
        let heard = self.server_tick.load(Ordering::Acquire);
        self.world.tick() <= heard.saturating_add(self.max_clock_drift)
    }

    /// Advances the local world by one tick, subject to admission control
    pub fn step(&mut self) -> StepOutcome {
        if self.state != SessionState::Synchronized {
            return StepOutcome::Idle;
        }
        if !self.admitted() {
            return StepOutcome::Stalled;
        }
        match self.world.step() {
            Some(_) => StepOutcome::Advanced,
            None => StepOutcome::Paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::codec::Counted;
    use shared::{WorldSnapshot, KEY_LEFT, LOOKAHEAD, MAX_CLOCK_DRIFT};

    fn synchronized(snapshot: WorldSnapshot, assigned_id: EntityId) -> Session {
        let mut session = Session::new("Nova", LOOKAHEAD, MAX_CLOCK_DRIFT);
        session.begin_connect();
        session
            .apply(ServerMessage::FullUpdate {
                snapshot,
                assigned_id,
            })
            .unwrap();
        session
    }

    #[test]
    fn test_full_update_on_empty_world() {
        let session = synchronized(WorldSnapshot::empty(), 1);

        assert_eq!(session.state(), SessionState::Synchronized);
        assert_eq!(session.local_id(), Some(1));
        assert_eq!(session.world().registry().ships(), vec![1]);
        assert_eq!(session.world().registry().get(1), Some(ship_spawn(1, "Nova")));
        assert_eq!(session.world().registry().next_id(), 2);
    }

    #[test]
    fn test_full_update_keeps_existing_ship() {
        let mut snapshot = WorldSnapshot::empty();
        snapshot.tick = 40;
        snapshot.next_id = 3;
        snapshot.entities = Counted(vec![ship_spawn(1, "Host"), ship_spawn(2, "Nova")]);

        let session = synchronized(snapshot, 2);
        assert_eq!(session.world().registry().len(), 2);
        assert_eq!(session.world().tick(), 40);
        assert!(session.admitted());
    }

    #[test]
    fn test_full_update_ignored_when_disconnected() {
        let mut session = Session::new("Nova", LOOKAHEAD, MAX_CLOCK_DRIFT);
        session
            .apply(ServerMessage::FullUpdate {
                snapshot: WorldSnapshot::empty(),
                assigned_id: 1,
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.world().registry().is_empty());
    }

    #[test]
    fn test_quit_for_unknown_entity_is_non_fatal() {
        let mut session = synchronized(WorldSnapshot::empty(), 1);
        session
            .apply(ServerMessage::PlayerJoined {
                entity: ship_spawn(7, "Vega"),
            })
            .unwrap();
        session.apply(ServerMessage::PlayerQuit { id: 7 }).unwrap();

        let err = session
            .apply(ServerMessage::PlayerQuit { id: 7 })
            .unwrap_err();
        assert!(matches!(err, NetError::UnknownPeer(7)));
        assert_eq!(session.state(), SessionState::Synchronized);
        assert_eq!(session.world().registry().ships(), vec![1]);
    }

    #[test]
    fn test_joined_and_position_update() {
        let mut session = synchronized(WorldSnapshot::empty(), 1);
        session
            .apply(ServerMessage::PlayerJoined {
                entity: ship_spawn(2, "Vega"),
            })
            .unwrap();
        session
            .apply(ServerMessage::PlayerUpdatePosition {
                id: 2,
                x: 10.0,
                y: 20.0,
                dx: 1.0,
                dy: -1.0,
            })
            .unwrap();

        let entity = session.world().registry().get(2).unwrap();
        let body = entity.body();
        assert_eq!((body.x, body.y, body.dx, body.dy), (10.0, 20.0, 1.0, -1.0));
        assert_eq!(entity.as_ship().unwrap().name, "Vega");

        assert!(matches!(
            session.apply(ServerMessage::PlayerUpdatePosition {
                id: 9,
                x: 0.0,
                y: 0.0,
                dx: 0.0,
                dy: 0.0,
            }),
            Err(NetError::UnknownPeer(9))
        ));
    }

    #[test]
    fn test_local_input_scheduled_ahead() {
        let session = synchronized(WorldSnapshot::empty(), 1);
        let action = session.input(KEY_LEFT).unwrap();

        assert_eq!(action, Action::new(1, KEY_LEFT, LOOKAHEAD));
        assert_eq!(session.world().scheduler().pending(), vec![action]);
    }

    #[test]
    fn test_no_input_before_synchronized() {
        let mut session = Session::new("Nova", LOOKAHEAD, MAX_CLOCK_DRIFT);
        session.begin_connect();
        assert!(session.input(KEY_LEFT).is_none());
        assert_eq!(session.step(), StepOutcome::Idle);
    }

    #[test]
    fn test_admission_control_stalls_and_resumes() {
        let mut session = synchronized(WorldSnapshot::empty(), 1);

        for _ in 0..=MAX_CLOCK_DRIFT {
            assert_eq!(session.step(), StepOutcome::Advanced);
        }
        assert_eq!(session.world().tick(), MAX_CLOCK_DRIFT + 1);
        assert_eq!(session.step(), StepOutcome::Stalled);
        assert_eq!(session.world().tick(), MAX_CLOCK_DRIFT + 1);

        session.apply(ServerMessage::Clock { tick: 2 }).unwrap();
        assert_eq!(session.step(), StepOutcome::Advanced);
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let mut session = synchronized(WorldSnapshot::empty(), 1);
        session.apply(ServerMessage::Clock { tick: 10 }).unwrap();
        session.apply(ServerMessage::Clock { tick: 8 }).unwrap();
        assert_eq!(session.server_tick().load(Ordering::Acquire), 10);
    }

    #[test]
    fn test_full_update_keeps_newer_clock() {
        let mut session = Session::new("Nova", LOOKAHEAD, MAX_CLOCK_DRIFT);
        session.begin_connect();
        session.apply(ServerMessage::Clock { tick: 10 }).unwrap();

        let mut snapshot = WorldSnapshot::empty();
        snapshot.tick = 4;
        session
            .apply(ServerMessage::FullUpdate {
                snapshot,
                assigned_id: 1,
            })
            .unwrap();

        assert_eq!(session.server_tick().load(Ordering::Acquire), 10);
        assert_eq!(session.world().tick(), 4);
    }

    #[test]
    fn test_pause_and_server_quitting() {
        let mut session = synchronized(WorldSnapshot::empty(), 1);

        session.apply(ServerMessage::Pause { paused: true }).unwrap();
        assert_eq!(session.step(), StepOutcome::Paused);

        session.apply(ServerMessage::ServerQuitting).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.local_id(), None);
    }
}
