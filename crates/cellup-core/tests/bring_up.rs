//! # Integration tests: full bring-up runs
//!
//! The device and console are plain channels fed by the test, the device
//! writer is a `Vec<u8>`, and the traffic log is an in-memory transcript.
//! No serial port is involved.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cellup_core::config::Timeouts;
use cellup_core::error::{EXIT_HARD_FAILURE, EXIT_NOT_RESPONDING, EXIT_SOURCE, EXIT_STATE_TIMEOUT};
use cellup_core::log::TabLog;
use cellup_core::source::Input;
use cellup_core::{BringUpConfig, Error, EventLoop, Exit, Mode, ModemState};
use crossbeam_channel::{unbounded, Sender};

// ─── Helpers ────────────────────────────────────────────────────────────────

type SharedLog = Arc<Mutex<TabLog<Vec<u8>>>>;

/// Writer whose contents stay readable after it is moved into the loop.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Rig {
    device_tx: Sender<Input>,
    console_tx: Sender<Input>,
    display: SharedBuf,
    log: SharedLog,
    lp: EventLoop<Vec<u8>, SharedLog>,
}

impl Rig {
    fn new(config: BringUpConfig) -> Self {
        let (device_tx, device_rx) = unbounded();
        let (console_tx, console_rx) = unbounded();
        let display = SharedBuf::default();
        let log: SharedLog = Arc::new(Mutex::new(TabLog::new(Vec::new())));
        let lp = EventLoop::new(&config, Vec::new(), device_rx, log.clone())
            .unwrap()
            .with_console(console_rx, display.clone());
        Rig {
            device_tx,
            console_tx,
            display,
            log,
            lp,
        }
    }

    fn modem_says(&self, text: &str) {
        self.device_tx
            .send(Input::Data(text.as_bytes().to_vec()))
            .unwrap();
    }

    fn operator_types(&self, text: &str) {
        self.console_tx
            .send(Input::Data(text.as_bytes().to_vec()))
            .unwrap();
    }

    /// Commands written to the device, CRLF stripped.
    fn commands(&self) -> Vec<String> {
        let raw = String::from_utf8(self.lp.device().clone()).unwrap();
        assert!(raw.is_empty() || raw.ends_with("\r\n"));
        raw.split_terminator("\r\n").map(str::to_string).collect()
    }

    /// Text column of the traffic log.
    fn transcript(&self) -> Vec<String> {
        let guard = self.log.lock().unwrap();
        String::from_utf8_lossy(guard.get_ref())
            .lines()
            .map(|l| l.split_once('\t').unwrap().1.to_string())
            .collect()
    }
}

fn fast_config() -> BringUpConfig {
    BringUpConfig {
        timeouts: Timeouts {
            test_link: Duration::from_secs(2),
            setup_data_context: Duration::from_secs(2),
            setup_radio_mode: Duration::from_secs(2),
            wait_network: Duration::from_secs(2),
            setup_link_mode: Duration::from_secs(2),
        },
        ..BringUpConfig::default()
    }
}

const CGDCONT: &str = "AT+CGDCONT=1,\"IPV4V6\",\"ctnet\"";

// ─── Happy path ─────────────────────────────────────────────────────────────

#[test]
fn full_bring_up_reaches_connected() {
    let mut rig = Rig::new(BringUpConfig {
        exit_on_connect: true,
        ..fast_config()
    });
    rig.modem_says("OK\n");
    rig.modem_says("\nOK\n");
    rig.modem_says("OK\n");
    rig.modem_says("+CGEV: ME PDN ACT 1\n");
    rig.modem_says("OK\n");

    assert_eq!(rig.lp.run().unwrap(), Exit::Connected);
    assert_eq!(rig.lp.session().state(), ModemState::Connected);
    assert!(!rig.lp.session().command_pending());

    // One command per sending state, in bring-up order.
    assert_eq!(
        rig.commands(),
        vec!["AT", CGDCONT, "AT+CFUN=1", "AT+ZGACT=1,1"]
    );
    assert_eq!(
        rig.transcript(),
        vec![
            "AT",
            "OK",
            CGDCONT,
            "OK",
            "AT+CFUN=1",
            "OK",
            "+CGEV: ME PDN ACT 1",
            "AT+ZGACT=1,1",
            "OK",
        ]
    );
}

#[test]
fn test_link_ack_sends_data_context_next() {
    let mut rig = Rig::new(fast_config());

    // Init re-evaluates straight into TestLink without waiting.
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.lp.session().state(), ModemState::TestLink);
    assert!(rig.commands().is_empty());

    rig.modem_says("OK\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.lp.session().state(), ModemState::SetupDataContext);
    assert!(!rig.lp.session().command_pending());
    assert_eq!(rig.commands(), vec!["AT"]);

    rig.modem_says("RDY\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.commands(), vec!["AT", CGDCONT]);
    assert!(rig.lp.session().command_pending());
    assert_eq!(rig.lp.session().state(), ModemState::SetupDataContext);
}

#[test]
fn connected_blocks_until_operator_exits() {
    let mut rig = Rig::new(fast_config());
    for reply in ["OK\n", "OK\n", "OK\n", "+CGEV: ME PDN ACT 1\n", "OK\n"] {
        rig.modem_says(reply);
    }
    while rig.lp.session().state() != ModemState::Connected {
        assert_eq!(rig.lp.step().unwrap(), None);
    }
    let sent = rig.commands().len();

    // Unrelated chatter keeps the loop running and sends nothing.
    rig.modem_says("+CSQ: 20,99\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.commands().len(), sent);
    assert_eq!(rig.lp.session().remaining(), None);

    let console = rig.console_tx.clone();
    let exiter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        console.send(Input::Data(b"EXIT\n".to_vec())).unwrap();
    });
    assert_eq!(rig.lp.step().unwrap(), Some(Exit::Operator));
    exiter.join().unwrap();
    assert_eq!(rig.commands().len(), sent);
}

// ─── Failures ───────────────────────────────────────────────────────────────

#[test]
fn hard_failure_aborts_run() {
    let mut rig = Rig::new(fast_config());
    rig.modem_says("OK\n");
    rig.modem_says("+CME ERROR: 123\n");

    let err = rig.lp.run().unwrap_err();
    match &err {
        Error::HardFailure { state, line } => {
            assert_eq!(*state, ModemState::SetupDataContext);
            assert_eq!(line, "+CME ERROR: 123");
        }
        other => panic!("expected hard failure, got {other:?}"),
    }
    assert_eq!(err.exit_code(), EXIT_HARD_FAILURE);
    assert_eq!(rig.lp.session().state(), ModemState::Error);
    assert!(rig.transcript().contains(&"+CME ERROR: 123".to_string()));
}

#[test]
fn silent_modem_is_not_responding() {
    let mut rig = Rig::new(BringUpConfig {
        timeouts: Timeouts {
            test_link: Duration::from_millis(50),
            ..fast_config().timeouts
        },
        ..fast_config()
    });
    let started = Instant::now();
    let err = rig.lp.run().unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(50));
    match &err {
        Error::NotResponding { state, command } => {
            assert_eq!(*state, ModemState::TestLink);
            assert_eq!(command, "AT");
        }
        other => panic!("expected not-responding, got {other:?}"),
    }
    assert_eq!(err.exit_code(), EXIT_NOT_RESPONDING);
    assert_eq!(rig.commands(), vec!["AT"]);
}

#[test]
fn each_command_state_times_out_on_its_own_command() {
    let short = Duration::from_millis(50);
    let cases: [(ModemState, &[&str], &str, Timeouts); 3] = [
        (
            ModemState::SetupDataContext,
            &["OK\n"],
            CGDCONT,
            Timeouts {
                setup_data_context: short,
                ..fast_config().timeouts
            },
        ),
        (
            ModemState::SetupRadioMode,
            &["OK\n", "OK\n"],
            "AT+CFUN=1",
            Timeouts {
                setup_radio_mode: short,
                ..fast_config().timeouts
            },
        ),
        (
            ModemState::SetupLinkMode,
            &["OK\n", "OK\n", "OK\n", "+CGEV: ME PDN ACT 1\n"],
            "AT+ZGACT=1,1",
            Timeouts {
                setup_link_mode: short,
                ..fast_config().timeouts
            },
        ),
    ];

    for (expected_state, replies, expected_command, timeouts) in cases {
        let mut rig = Rig::new(BringUpConfig {
            timeouts,
            ..fast_config()
        });
        for reply in replies {
            rig.modem_says(reply);
        }

        let err = rig.lp.run().unwrap_err();
        match &err {
            Error::NotResponding { state, command } => {
                assert_eq!(*state, expected_state);
                assert_eq!(command, expected_command);
            }
            other => panic!("expected not-responding in {expected_state}, got {other:?}"),
        }
        assert_eq!(err.exit_code(), EXIT_NOT_RESPONDING);
        assert_eq!(rig.commands().last().map(String::as_str), Some(expected_command));
    }
}

#[test]
fn network_wait_times_out() {
    let mut rig = Rig::new(BringUpConfig {
        timeouts: Timeouts {
            wait_network: Duration::from_millis(50),
            ..fast_config().timeouts
        },
        ..fast_config()
    });
    for _ in 0..3 {
        rig.modem_says("OK\n");
    }
    let err = rig.lp.run().unwrap_err();
    assert!(matches!(
        err,
        Error::StateTimeout {
            state: ModemState::WaitNetwork
        }
    ));
    assert_eq!(err.exit_code(), EXIT_STATE_TIMEOUT);
}

#[test]
fn console_input_does_not_extend_ack_deadline() {
    let mut rig = Rig::new(BringUpConfig {
        timeouts: Timeouts {
            test_link: Duration::from_millis(300),
            ..fast_config().timeouts
        },
        ..fast_config()
    });
    let console = rig.console_tx.clone();
    let chatter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        let _ = console.send(Input::Data(b"status\n".to_vec()));
    });

    let started = Instant::now();
    let err = rig.lp.run().unwrap_err();
    let elapsed = started.elapsed();
    chatter.join().unwrap();

    assert!(matches!(err, Error::NotResponding { .. }));
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    // A restarted budget would have run to ~450ms.
    assert!(elapsed < Duration::from_millis(440), "{elapsed:?}");
}

#[test]
fn device_error_wins_over_console_exit() {
    let mut rig = Rig::new(fast_config());
    rig.device_tx
        .send(Input::Failed(io::Error::new(io::ErrorKind::Other, "framing")))
        .unwrap();
    rig.operator_types("EXIT\n");

    let err = rig.lp.run().unwrap_err();
    assert!(matches!(
        err,
        Error::Source {
            source_kind: cellup_core::error::Source::Device,
            ..
        }
    ));
    assert_eq!(err.exit_code(), EXIT_SOURCE);
}

#[test]
fn device_hangup_is_fatal() {
    let mut rig = Rig::new(fast_config());
    // Replacing the only sender disconnects the device channel.
    rig.device_tx = unbounded().0;

    let err = rig.lp.run().unwrap_err();
    assert_eq!(err.exit_code(), EXIT_SOURCE);
}

#[test]
fn device_write_failure_is_fatal() {
    let (_device_tx, device_rx) = unbounded();
    let mut lp = EventLoop::new(&fast_config(), FailingWriter, device_rx, cellup_core::log::NullLog)
        .unwrap();
    let err = lp.run().unwrap_err();
    assert!(matches!(err, Error::Source { .. }));
    assert_eq!(lp.session().state(), ModemState::TestLink);
}

#[test]
fn console_hangup_is_not_fatal() {
    let mut rig = Rig::new(BringUpConfig {
        exit_on_connect: true,
        ..fast_config()
    });
    rig.console_tx = unbounded().0;
    for reply in ["OK\n", "OK\n", "OK\n", "+CGEV: ME PDN ACT 1\n", "OK\n"] {
        rig.modem_says(reply);
    }
    assert_eq!(rig.lp.run().unwrap(), Exit::Connected);
}

#[test]
fn framing_error_drops_rest_of_read_only() {
    let mut rig = Rig::new(fast_config());
    assert_eq!(rig.lp.step().unwrap(), None);

    let mut noisy = vec![b'~'; 300];
    noisy.extend_from_slice(b"\nOK\n");
    rig.device_tx.send(Input::Data(noisy)).unwrap();
    assert_eq!(rig.lp.step().unwrap(), None);
    // The OK after the oversized record was abandoned with it.
    assert_eq!(rig.lp.session().state(), ModemState::TestLink);
    assert!(rig.lp.session().command_pending());

    rig.modem_says("OK\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.lp.session().state(), ModemState::SetupDataContext);
}

// ─── Console ────────────────────────────────────────────────────────────────

#[test]
fn exit_ends_automatic_run() {
    let mut rig = Rig::new(fast_config());
    rig.operator_types("hello\nEXIT\n");
    assert_eq!(rig.lp.run().unwrap(), Exit::Operator);
    // Only the automatic command went out.
    assert_eq!(rig.commands(), vec!["AT"]);
}

#[test]
fn interactive_mode_forwards_console_and_echoes_device() {
    let mut rig = Rig::new(BringUpConfig {
        mode: Mode::Interactive,
        ..fast_config()
    });

    rig.operator_types("AT+CSQ\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.commands(), vec!["AT+CSQ"]);
    assert_eq!(rig.lp.session().state(), ModemState::Init);
    assert!(!rig.lp.session().command_pending());

    rig.modem_says("+CSQ: 20,99\n\nOK\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.display.text(), "+CSQ: 20,99\nOK\n");
    assert_eq!(rig.lp.session().state(), ModemState::Init);

    // Failures are only displayed while the operator drives.
    rig.modem_says("+CME ERROR: 4\n");
    assert_eq!(rig.lp.step().unwrap(), None);
    assert_eq!(rig.lp.session().state(), ModemState::Init);

    rig.operator_types("EXIT\n");
    assert_eq!(rig.lp.step().unwrap(), Some(Exit::Operator));
    assert_eq!(
        rig.transcript(),
        vec!["AT+CSQ", "+CSQ: 20,99", "OK", "+CME ERROR: 4"]
    );
}

#[test]
fn soft_reset_is_written_and_logged() {
    let mut rig = Rig::new(fast_config());
    rig.lp.soft_reset().unwrap();
    assert_eq!(rig.commands(), vec!["AT+ZSOFTRESET"]);
    assert_eq!(rig.transcript(), vec!["AT+ZSOFTRESET"]);
    assert_eq!(rig.lp.session().state(), ModemState::Init);
}
