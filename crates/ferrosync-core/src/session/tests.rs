use super::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const OWNER: &str = "org.example.Viewer1";
const WINDOW: &str = "/org/example/Viewer1/Window/0";

fn session(spawn: SpawnPolicy) -> SyncSession {
    let uri = DocumentUri::from_path(Path::new("/tmp/x.pdf")).unwrap();
    SyncSession::new(uri, spawn)
}

fn find_generation(actions: &[Action]) -> u64 {
    actions
        .iter()
        .find_map(|a| match a {
            Action::FindDocument { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("expected a FindDocument action")
}

fn count_find(actions: &[Action]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, Action::FindDocument { .. }))
        .count()
}

fn loaded(owner: &str) -> SessionEvent {
    SessionEvent::DocumentLoadedSignal(DocumentLoaded {
        uri: "file:///tmp/x.pdf".to_string(),
        owner: owner.to_string(),
    })
}

/// Drives a fresh session through probe, reply and window list up to the bind.
fn binding_session(s: &mut SyncSession) -> u64 {
    let generation = find_generation(&s.start());
    let actions = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(OWNER.to_string()),
    });
    assert_eq!(
        actions,
        vec![Action::GetWindowList {
            generation,
            owner: OWNER.to_string()
        }]
    );
    let actions = s.handle(SessionEvent::WindowListReply {
        generation,
        result: Ok(vec![WINDOW.to_string()]),
    });
    let binding = match actions.as_slice() {
        [Action::BindWindow { binding, .. }] => *binding,
        other => panic!("Expected a single BindWindow, got {:?}", other),
    };
    binding
}

fn running_session() -> (SyncSession, u64) {
    let mut s = session(SpawnPolicy::Allowed);
    let binding = binding_session(&mut s);
    assert!(s.handle(SessionEvent::BindSucceeded { binding }).is_empty());
    (s, binding)
}

#[test]
fn test_start_probes_without_spawning() {
    let mut s = session(SpawnPolicy::Allowed);
    let actions = s.start();
    assert!(matches!(
        actions[0],
        Action::FindDocument { spawn: false, .. }
    ));
    assert!(matches!(actions[1], Action::ArmTimeout { .. }));
    assert_eq!(s.state(), SessionState::Closed);
    assert!(s.start().is_empty(), "probe must not be issued twice");
}

#[test]
fn test_reply_with_owner_binds_exactly_one_window() {
    let (s, binding) = running_session();
    assert_eq!(s.state(), SessionState::Running);
    assert_eq!(s.owner(), OWNER);
    let window = s.window().unwrap();
    assert_eq!(window.binding, binding);
    assert_eq!(window.window, WINDOW);
    assert!(!s.is_discovering());
}

#[test]
fn test_forward_search_while_running_is_sent_immediately() {
    let (mut s, binding) = running_session();
    let cmd = SyncCommand::new("/tmp/x.tex", 10, 1, 42);
    let actions = s.request_forward_search(cmd.clone());
    assert_eq!(
        actions,
        vec![Action::SyncView {
            binding,
            command: cmd
        }]
    );
    assert!(s.pending().is_none());
}

#[test]
fn test_closed_signal_releases_window_and_next_request_rediscovers_once() {
    let (mut s, binding) = running_session();
    let actions = s.handle(SessionEvent::ClosedSignal { binding });
    assert_eq!(actions, vec![Action::ReleaseWindow { binding }]);
    assert_eq!(s.state(), SessionState::Closed);
    assert!(s.window().is_none());
    assert_eq!(s.owner(), "");

    let actions = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 3, 1, 0));
    assert_eq!(count_find(&actions), 1);
    assert!(matches!(
        actions[0],
        Action::FindDocument { spawn: true, .. }
    ));

    let again = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 4, 1, 0));
    assert_eq!(count_find(&again), 0, "discovery already in flight");
}

#[test]
fn test_broadcast_before_reply_wins_and_late_reply_is_noop() {
    let mut s = session(SpawnPolicy::Allowed);
    s.start();
    let actions = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 7, 1, 0));
    let generation = find_generation(&actions);

    let actions = s.handle(loaded(":1.42"));
    assert_eq!(
        actions,
        vec![Action::GetWindowList {
            generation,
            owner: ":1.42".to_string()
        }]
    );

    // The reply for the same attempt arrives while the window list is outstanding.
    let late = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(":1.42".to_string()),
    });
    assert!(late.is_empty());

    let actions = s.handle(SessionEvent::WindowListReply {
        generation,
        result: Ok(vec![WINDOW.to_string()]),
    });
    let binding = match actions.as_slice() {
        [Action::BindWindow { binding, .. }] => *binding,
        other => panic!("Expected a single BindWindow, got {:?}", other),
    };
    let actions = s.handle(SessionEvent::BindSucceeded { binding });
    assert!(matches!(
        actions.as_slice(),
        [Action::SyncView { command, .. }] if command.line == 7
    ));
    assert_eq!(s.owner(), ":1.42");

    // And once running, neither a late reply nor a repeated broadcast rebinds.
    let late = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(":1.42".to_string()),
    });
    assert!(late.is_empty());
    assert!(s.handle(loaded(":1.42")).is_empty());
}

#[test]
fn test_reply_before_broadcast_ignores_broadcast() {
    let mut s = session(SpawnPolicy::Allowed);
    let generation = find_generation(&s.start());
    let actions = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(OWNER.to_string()),
    });
    assert_eq!(actions.len(), 1);
    assert!(s.handle(loaded(OWNER)).is_empty());
}

#[test]
fn test_broadcast_for_other_document_is_ignored() {
    let mut s = session(SpawnPolicy::Allowed);
    s.start();
    let actions = s.handle(SessionEvent::DocumentLoadedSignal(DocumentLoaded {
        uri: "file:///tmp/other.pdf".to_string(),
        owner: OWNER.to_string(),
    }));
    assert!(actions.is_empty());
}

#[test]
fn test_unsolicited_broadcast_attaches_to_viewer() {
    let mut s = session(SpawnPolicy::Forbidden);
    let actions = s.handle(loaded(OWNER));
    assert!(matches!(&actions[0], Action::GetWindowList { owner, .. } if owner == OWNER));
    assert!(matches!(actions[1], Action::ArmTimeout { .. }));
    assert!(s.is_discovering());
}

#[test]
fn test_empty_owner_keeps_pending_command() {
    let mut s = session(SpawnPolicy::Allowed);
    let cmd = SyncCommand::new("/tmp/x.tex", 12, 1, 0);
    let generation = find_generation(&s.request_forward_search(cmd.clone()));

    let actions = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(String::new()),
    });
    assert!(actions.is_empty());
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(s.pending(), Some(&cmd));
}

#[test]
fn test_empty_probe_reply_ends_discovery() {
    let mut s = session(SpawnPolicy::Allowed);
    let generation = find_generation(&s.start());
    s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(String::new()),
    });
    assert!(!s.is_discovering());
}

#[test]
fn test_spawning_discovery_waits_for_broadcast_after_empty_reply() {
    let mut s = session(SpawnPolicy::Allowed);
    let generation = find_generation(&s.request_forward_search(SyncCommand::new(
        "/tmp/x.tex",
        1,
        1,
        0,
    )));
    s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(String::new()),
    });
    assert!(s.is_discovering());
    let actions = s.handle(loaded(":1.7"));
    assert_eq!(
        actions,
        vec![Action::GetWindowList {
            generation,
            owner: ":1.7".to_string()
        }]
    );
}

#[test]
fn test_pending_command_is_overwritten() {
    let mut s = session(SpawnPolicy::Allowed);
    let first = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 1, 1, 0));
    assert_eq!(count_find(&first), 1);
    let second = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 2, 5, 9));
    assert_eq!(count_find(&second), 0);
    assert_eq!(s.pending(), Some(&SyncCommand::new("/tmp/x.tex", 2, 5, 9)));
}

#[test]
fn test_pending_slot_returns_displaced_command() {
    let mut slot = PendingSlot::default();
    assert!(slot.offer(SyncCommand::new("a.tex", 1, 1, 0)).is_none());
    let displaced = slot.offer(SyncCommand::new("b.tex", 2, 1, 0)).unwrap();
    assert_eq!(displaced.input_file, PathBuf::from("a.tex"));
    assert_eq!(slot.take().unwrap().input_file, PathBuf::from("b.tex"));
    assert!(slot.is_empty());
}

#[test]
fn test_spawn_forbidden_drops_request() {
    let mut s = session(SpawnPolicy::Forbidden);
    let actions = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 1, 1, 0));
    assert!(actions.is_empty());
    assert!(s.pending().is_none());
    assert!(!s.is_discovering());
}

#[test]
fn test_request_supersedes_probe() {
    let mut s = session(SpawnPolicy::Allowed);
    let probe = find_generation(&s.start());
    let actions = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 1, 1, 0));
    let spawn = find_generation(&actions);
    assert_ne!(probe, spawn);
    assert!(matches!(
        actions[0],
        Action::FindDocument { spawn: true, .. }
    ));

    // The probe's answer is stale now.
    let stale = s.handle(SessionEvent::DiscoveryReply {
        generation: probe,
        result: Ok(OWNER.to_string()),
    });
    assert!(stale.is_empty());
    assert!(s.is_discovering());
}

#[test]
fn test_daemon_failure_keeps_pending() {
    let mut s = session(SpawnPolicy::Allowed);
    let cmd = SyncCommand::new("/tmp/x.tex", 5, 1, 0);
    let generation = find_generation(&s.request_forward_search(cmd.clone()));
    let actions = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Err(SyncError::DaemonUnavailable("no daemon".into())),
    });
    assert!(actions.is_empty());
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(s.pending(), Some(&cmd));
    assert!(matches!(s.last_error(), Some(SyncError::DaemonUnavailable(_))));

    // A later explicit request retries.
    let retry = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 6, 1, 0));
    assert_eq!(count_find(&retry), 1);
}

#[test]
fn test_empty_window_list_is_integrity_error() {
    let mut s = session(SpawnPolicy::Allowed);
    let generation = find_generation(&s.start());
    s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(OWNER.to_string()),
    });
    let actions = s.handle(SessionEvent::WindowListReply {
        generation,
        result: Ok(vec![]),
    });
    assert!(actions.is_empty());
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(
        s.last_error(),
        Some(&SyncError::Integrity {
            owner: OWNER.to_string()
        })
    );
}

#[test]
fn test_window_list_failure_stays_closed() {
    let mut s = session(SpawnPolicy::Allowed);
    let generation = find_generation(&s.start());
    s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(OWNER.to_string()),
    });
    s.handle(SessionEvent::WindowListReply {
        generation,
        result: Err(SyncError::call_failed("GetWindowList", "NoReply")),
    });
    assert_eq!(s.state(), SessionState::Closed);
    assert!(!s.is_discovering());
}

#[test]
fn test_timeout_abandons_attempt_and_keeps_pending() {
    let mut s = session(SpawnPolicy::Allowed).with_discovery_timeout(Duration::from_millis(50));
    let cmd = SyncCommand::new("/tmp/x.tex", 8, 1, 0);
    let actions = s.request_forward_search(cmd.clone());
    let generation = find_generation(&actions);
    assert!(actions.contains(&Action::ArmTimeout {
        generation,
        after: Duration::from_millis(50)
    }));

    s.handle(SessionEvent::DiscoveryTimeout { generation });
    assert!(!s.is_discovering());
    assert_eq!(s.pending(), Some(&cmd));
    assert_eq!(
        s.last_error(),
        Some(&SyncError::Timeout(Duration::from_millis(50)))
    );

    // The reply that finally shows up belongs to an abandoned attempt.
    let late = s.handle(SessionEvent::DiscoveryReply {
        generation,
        result: Ok(OWNER.to_string()),
    });
    assert!(late.is_empty());
}

#[test]
fn test_timeout_of_finished_attempt_is_ignored() {
    let (mut s, _) = running_session();
    s.handle(SessionEvent::DiscoveryTimeout { generation: 1 });
    assert_eq!(s.state(), SessionState::Running);
    assert!(s.last_error().is_none());
}

#[test]
fn test_backward_search_reaches_handler_with_local_path() {
    let (mut s, binding) = running_session();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    s.set_backward_search_handler(Box::new(move |path: &Path, line: i32, column: i32| {
        sink.lock().unwrap().push((path.to_path_buf(), line, column));
    }));

    s.handle(SessionEvent::SyncSourceSignal {
        binding,
        event: BackwardSearchEvent {
            source_file_uri: "file:///tmp/a%20b.tex".to_string(),
            line: 33,
            column: 2,
            timestamp: 0,
        },
    });
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[(PathBuf::from("/tmp/a b.tex"), 33, 2)]
    );
}

#[test]
fn test_handler_registration_overwrites() {
    let (mut s, binding) = running_session();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = seen.clone();
    s.set_backward_search_handler(Box::new(move |_: &Path, _: i32, _: i32| first.lock().unwrap().push("first")));
    let second = seen.clone();
    s.set_backward_search_handler(Box::new(move |_: &Path, _: i32, _: i32| second.lock().unwrap().push("second")));

    s.handle(SessionEvent::SyncSourceSignal {
        binding,
        event: BackwardSearchEvent {
            source_file_uri: "/tmp/x.tex".to_string(),
            line: 1,
            column: 1,
            timestamp: 0,
        },
    });
    assert_eq!(seen.lock().unwrap().as_slice(), &["second"]);
}

#[test]
fn test_signals_of_released_window_are_ignored() {
    let (mut s, binding) = running_session();
    s.handle(SessionEvent::ClosedSignal { binding });

    let called = Arc::new(Mutex::new(false));
    let flag = called.clone();
    s.set_backward_search_handler(Box::new(move |_: &Path, _: i32, _: i32| *flag.lock().unwrap() = true));
    s.handle(SessionEvent::SyncSourceSignal {
        binding,
        event: BackwardSearchEvent {
            source_file_uri: "/tmp/x.tex".to_string(),
            line: 1,
            column: 1,
            timestamp: 0,
        },
    });
    assert!(!*called.lock().unwrap());
    assert!(s.handle(SessionEvent::ClosedSignal { binding }).is_empty());
}

#[test]
fn test_bind_failure_returns_to_closed() {
    let mut s = session(SpawnPolicy::Allowed);
    let binding = binding_session(&mut s);
    let cmd = SyncCommand::new("/tmp/x.tex", 10, 1, 0);
    assert!(s.request_forward_search(cmd.clone()).is_empty());

    let actions = s.handle(SessionEvent::BindFailed {
        binding,
        error: SyncError::call_failed("AddMatch", "denied"),
    });
    assert_eq!(actions, vec![Action::ReleaseWindow { binding }]);
    assert_eq!(s.state(), SessionState::Closed);
    assert!(s.window().is_none());
    assert!(!s.is_discovering());
    assert_eq!(s.pending(), Some(&cmd));

    // The kept command drives the next attempt.
    let retry = s.request_forward_search(SyncCommand::new("/tmp/x.tex", 11, 1, 0));
    assert_eq!(count_find(&retry), 1);
}

#[test]
fn test_not_running_until_window_subscribed() {
    let mut s = session(SpawnPolicy::Allowed);
    let binding = binding_session(&mut s);
    assert_eq!(s.state(), SessionState::Closed);
    assert!(s.window().is_none());
    assert_eq!(s.owner(), "");

    // Requests made while subscribing wait in the slot, without a new discovery.
    let cmd = SyncCommand::new("/tmp/x.tex", 10, 1, 5);
    assert!(s.request_forward_search(cmd.clone()).is_empty());
    assert_eq!(s.pending(), Some(&cmd));
    assert!(s.handle(loaded(OWNER)).is_empty());

    let actions = s.handle(SessionEvent::BindSucceeded { binding });
    assert_eq!(actions, vec![Action::SyncView { binding, command: cmd }]);
    assert_eq!(s.state(), SessionState::Running);
    assert!(s.pending().is_none());
}

#[test]
fn test_bind_confirmed_after_timeout_is_released() {
    let mut s = session(SpawnPolicy::Allowed);
    let binding = binding_session(&mut s);
    s.handle(SessionEvent::DiscoveryTimeout { generation: 1 });
    assert!(!s.is_discovering());

    let actions = s.handle(SessionEvent::BindSucceeded { binding });
    assert_eq!(actions, vec![Action::ReleaseWindow { binding }]);
    assert_eq!(s.state(), SessionState::Closed);
    assert!(s
        .handle(SessionEvent::BindFailed {
            binding,
            error: SyncError::call_failed("AddMatch", "late"),
        })
        .is_empty());
}
