//! Signal-driven shutdown. Kept in its own test binary: the signals are
//! delivered to the whole process.
#![cfg(unix)]

use std::time::Duration;

use mdrec_recorder_lib::{shutdown, Liveness};

fn raise(signal: libc::c_int) {
    // SAFETY: sending a signal to our own pid has no memory-safety concerns
    let rc = unsafe { libc::kill(libc::getpid(), signal) };
    assert_eq!(rc, 0);
}

#[tokio::test]
async fn test_termination_signals_stop_receiving() {
    let liveness = Liveness::new();
    let handle = shutdown::spawn(liveness.clone()).unwrap();

    raise(libc::SIGTERM);
    tokio::time::timeout(Duration::from_secs(5), liveness.stopped())
        .await
        .unwrap();
    assert!(!liveness.is_receiving());

    // A repeated signal is absorbed; the process keeps running
    raise(libc::SIGINT);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!liveness.is_receiving());
    assert!(!handle.is_finished());

    handle.abort();
}
