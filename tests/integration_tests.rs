//! Integration tests for the networked session
//!
//! These tests run a real server on an ephemeral port and talk to it over TCP
//! the way the client binary does.

use assert_approx_eq::assert_approx_eq;
use client::game::JudgmentEvent;
use client::handshake;
use client::network::Connection;
use server::error::ServerError;
use server::game::Reconciler;
use server::network::{Server, ServerConfig};
use shared::protocol::{
    expect_token, read_frame, read_start_instant, send_token, write_frame, write_name, ACK,
    CONNECTION_ESTABLISHED, NAME_REQUEST, PING, PONG,
};
use shared::{unix_seconds, Chart, Judgment, Note, SessionStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn test_chart() -> Chart {
    Chart {
        notes: vec![
            Note::new(0, 1, 0, 0),
            Note::new(1, 2, 500, 0),
            Note::new(2, 3, 1000, 1000),
            Note::new(3, 8, 1500, 0),
        ],
        end: 5000,
        audio: "song.mp3".to_string(),
        offset: 0,
    }
}

type Session = JoinHandle<Result<SessionStats, ServerError>>;

async fn start_server_with(chart: &Chart, players: usize) -> (SocketAddr, Arc<Reconciler>, Session) {
    let config = ServerConfig {
        max_players: players,
        start_lead: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let server = Server::bind("127.0.0.1:0", chart, config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let reconciler = server.reconciler();
    (addr, reconciler, tokio::spawn(server.run()))
}

async fn start_server(players: usize) -> (SocketAddr, Session) {
    let (addr, _, session) = start_server_with(&test_chart(), players).await;
    (addr, session)
}

async fn next_frame(stream: &mut TcpStream) -> Option<String> {
    timeout(TEST_TIMEOUT, read_frame(stream))
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
}

async fn finish(session: Session) -> Result<SessionStats, ServerError> {
    timeout(TEST_TIMEOUT, session)
        .await
        .expect("session did not end")
        .unwrap()
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Tests a full two-player session from handshake to final statistics
    #[tokio::test]
    async fn two_player_session() {
        let (addr, session) = start_server(2).await;
        let addr = addr.to_string();

        let (alice, bob) = tokio::join!(
            handshake::connect(&addr, "alice"),
            handshake::connect(&addr, "bob")
        );
        let (mut alice, alice_start) = alice.unwrap();
        let (mut bob, bob_start) = bob.unwrap();

        // Both start instants are in the near future and within one RTT of
        // each other
        let now = unix_seconds();
        assert!(alice_start > now - 1.0 && alice_start < now + 2.0);
        assert_approx_eq!(alice_start, bob_start, 1.0);

        write_frame(&mut alice, "alice, 0, Excellent").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 0, Excellent"));
        assert_eq!(next_frame(&mut bob).await.as_deref(), Some("alice, 0, Excellent"));

        // A later hit on a scored note is discarded, so the next echo is the miss
        write_frame(&mut bob, "bob, 0, Good").await.unwrap();
        write_frame(&mut bob, "bob, 1, No Credit").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("bob, 1, No Credit"));
        assert_eq!(next_frame(&mut bob).await.as_deref(), Some("bob, 1, No Credit"));

        // The second miss confirms it and is echoed as well
        write_frame(&mut alice, "alice, 1, No Credit").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 1, No Credit"));
        assert_eq!(next_frame(&mut bob).await.as_deref(), Some("alice, 1, No Credit"));

        drop(alice);
        drop(bob);

        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 500);
        assert_eq!(stats.max_combo, 1);
        assert_eq!(stats.count(Judgment::Excellent), 1);
        assert_eq!(stats.count(Judgment::NoCredit), 1);
        assert_eq!(stats.count(Judgment::Good), 0);
        assert_eq!(stats.unjudged, 2);
    }

    /// Tests that a miss followed by the other player's hit upgrades the note
    #[tokio::test]
    async fn miss_then_hit_upgrades_note() {
        let (addr, session) = start_server(2).await;
        let addr = addr.to_string();

        let (alice, bob) = tokio::join!(
            handshake::connect(&addr, "alice"),
            handshake::connect(&addr, "bob")
        );
        let (mut alice, _) = alice.unwrap();
        let (mut bob, _) = bob.unwrap();

        write_frame(&mut alice, "alice, 3, No Credit").await.unwrap();
        assert_eq!(next_frame(&mut bob).await.as_deref(), Some("alice, 3, No Credit"));

        write_frame(&mut bob, "bob, 3, Very Good").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 3, No Credit"));
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("bob, 3, Very Good"));

        drop(alice);
        drop(bob);

        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 400);
        assert_eq!(stats.count(Judgment::VeryGood), 1);
        assert_eq!(stats.count(Judgment::NoCredit), 0);
    }

    /// Tests that malformed frames and unknown notes do not end the session
    #[tokio::test]
    async fn bad_frames_are_skipped() {
        let (addr, session) = start_server(1).await;

        let (mut alice, _) = handshake::connect(&addr.to_string(), "alice").await.unwrap();
        write_frame(&mut alice, "alice 0 Excellent").await.unwrap();
        write_frame(&mut alice, "alice, 42, Excellent").await.unwrap();
        write_frame(&mut alice, "alice, 2, Fair").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 2, Fair"));

        drop(alice);
        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 200);
    }

    /// Tests that an unknown judgment label aborts the session with an error
    #[tokio::test]
    async fn invalid_label_is_fatal() {
        let (addr, session) = start_server(1).await;

        let (mut alice, _) = handshake::connect(&addr.to_string(), "alice").await.unwrap();
        write_frame(&mut alice, "alice, 0, Marvelous").await.unwrap();

        assert!(matches!(finish(session).await, Err(ServerError::Protocol(_))));
    }

    /// Tests that the session ends on its own once the chart is over
    #[tokio::test]
    async fn session_ends_at_chart_end() {
        let chart = Chart {
            end: 300,
            ..test_chart()
        };
        let (addr, _, session) = start_server_with(&chart, 1).await;

        let (mut alice, start) = handshake::connect(&addr.to_string(), "alice").await.unwrap();
        write_frame(&mut alice, "alice, 0, Good").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 0, Good"));

        // Alice stays connected; the server still closes the session
        let stats = finish(session).await.unwrap();
        assert!(unix_seconds() >= start + 0.3);
        assert_eq!(stats.score, 300);
        assert_eq!(next_frame(&mut alice).await, None);
    }

    /// Tests that a reconciler handle taken before the session reports live
    /// statistics while players are still connected
    #[tokio::test]
    async fn reconciler_handle_reports_running_session() {
        let (addr, reconciler, session) = start_server_with(&test_chart(), 1).await;

        let (mut alice, _) = handshake::connect(&addr.to_string(), "alice").await.unwrap();
        write_frame(&mut alice, "alice, 1, Very Good").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 1, Very Good"));

        assert!(!session.is_finished());
        let stats = reconciler.stats().await;
        assert_eq!(stats.score, 400);
        assert_eq!(stats.count(Judgment::VeryGood), 1);

        drop(alice);
        finish(session).await.unwrap();
    }
}

/// CONNECTION FAILURE TESTS
mod failure_tests {
    use super::*;

    /// Tests that a wrong acknowledgment drops only that connection
    #[tokio::test]
    async fn handshake_rejection_spares_other_player() {
        let (addr, session) = start_server(2).await;
        let addr = addr.to_string();

        let mallory = async {
            let mut stream = TcpStream::connect(&addr).await.unwrap();
            expect_token(&mut stream, "name request", NAME_REQUEST).await.unwrap();
            write_name(&mut stream, "mallory").await.unwrap();
            expect_token(&mut stream, "connection established", CONNECTION_ESTABLISHED)
                .await
                .unwrap();
            send_token(&mut stream, b"NAK").await.unwrap();
            stream
        };

        let (alice, mut mallory) = tokio::join!(handshake::connect(&addr, "alice"), mallory);
        let (mut alice, _) = alice.unwrap();

        write_frame(&mut alice, "alice, 0, Good").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 0, Good"));

        // The rejected connection is closed by the server
        let mut rest = Vec::new();
        let read = timeout(TEST_TIMEOUT, tokio::io::AsyncReadExt::read_to_end(&mut mallory, &mut rest))
            .await
            .expect("rejected connection was not closed");
        assert!(read.is_err() || rest.is_empty());

        drop(alice);
        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 300);
    }

    /// Tests that a player who does not acknowledge the start instant is
    /// dropped while the other player still plays
    #[tokio::test]
    async fn unacknowledged_start_spares_other_player() {
        let (addr, session) = start_server(2).await;
        let addr = addr.to_string();

        let mallory = async {
            let mut stream = TcpStream::connect(&addr).await.unwrap();
            expect_token(&mut stream, "name request", NAME_REQUEST).await.unwrap();
            write_name(&mut stream, "mallory").await.unwrap();
            expect_token(&mut stream, "connection established", CONNECTION_ESTABLISHED)
                .await
                .unwrap();
            send_token(&mut stream, ACK).await.unwrap();
            expect_token(&mut stream, "latency probe", PING).await.unwrap();
            send_token(&mut stream, PONG).await.unwrap();
            read_start_instant(&mut stream).await.unwrap();
            send_token(&mut stream, b"NAK").await.unwrap();
            stream
        };

        let (alice, mut mallory) = tokio::join!(handshake::connect(&addr, "alice"), mallory);
        let (mut alice, _) = alice.unwrap();

        write_frame(&mut alice, "alice, 3, Excellent").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 3, Excellent"));

        // Mallory never joined the session, so no echo reaches that socket
        let mut rest = Vec::new();
        let read = timeout(TEST_TIMEOUT, tokio::io::AsyncReadExt::read_to_end(&mut mallory, &mut rest))
            .await
            .expect("unacknowledged connection was not closed");
        assert!(read.is_err() || rest.is_empty());

        drop(alice);
        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 500);
        assert_eq!(stats.max_combo, 1);
    }

    /// Tests that one player leaving mid-session does not stop the other
    #[tokio::test]
    async fn disconnect_mid_session() {
        let (addr, session) = start_server(2).await;
        let addr = addr.to_string();

        let (alice, bob) = tokio::join!(
            handshake::connect(&addr, "alice"),
            handshake::connect(&addr, "bob")
        );
        let (mut alice, _) = alice.unwrap();
        let (mut bob, _) = bob.unwrap();

        write_frame(&mut bob, "bob, 0, Excellent").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("bob, 0, Excellent"));
        drop(bob);

        write_frame(&mut alice, "alice, 1, Excellent").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 1, Excellent"));
        write_frame(&mut alice, "alice, 2, Fair").await.unwrap();
        assert_eq!(next_frame(&mut alice).await.as_deref(), Some("alice, 2, Fair"));

        drop(alice);
        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 1200);
        assert_eq!(stats.max_combo, 3);
        assert_eq!(stats.unjudged, 1);
    }

    /// Tests that the session fails when nobody finishes the handshake
    #[tokio::test]
    async fn no_players_synchronized() {
        let (addr, session) = start_server(1).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        assert!(matches!(finish(session).await, Err(ServerError::NoPlayers)));
    }
}

/// CLIENT CHANNEL TESTS
mod channel_tests {
    use super::*;
    use tokio::runtime::Handle;

    /// Tests the client's send and receive tasks against a real server
    #[tokio::test]
    async fn client_connection_round_trip() {
        let (addr, session) = start_server(1).await;

        let (stream, _) = handshake::connect(&addr.to_string(), "alice").await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut connection = Connection::spawn(&Handle::current(), reader, writer, "alice".to_string());

        connection.send(JudgmentEvent {
            note_id: 3,
            judgment: Judgment::Poor,
        });

        let mut received = Vec::new();
        for _ in 0..200 {
            received.extend(connection.drain());
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(received, vec![(3, Judgment::Poor)]);

        connection.shutdown().await;
        let stats = finish(session).await.unwrap();
        assert_eq!(stats.score, 100);
        assert_eq!(stats.count(Judgment::Poor), 1);
    }
}

/// CHART TESTS
mod chart_tests {
    use super::*;
    use shared::{ChartError, LANE_COUNT};

    /// Tests that the bundled chart loads and covers every lane
    #[test]
    fn bundled_chart_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/charts/basic.chart");
        let chart = Chart::load(path).unwrap();

        assert!(!chart.is_empty());
        assert!(chart.notes.iter().all(|note| note.judgment.is_none()));
        assert!(chart.notes.iter().any(|note| note.is_hold()));
        for lane in 1..=LANE_COUNT as u8 {
            assert!(chart.notes.iter().any(|note| note.lane == lane));
        }
        let last = chart.notes.iter().map(|note| note.end_time()).max().unwrap();
        assert!(chart.end > last);

        // The audio track is not shipped with the repository
        assert!(matches!(chart.audio_path(path), Err(ChartError::MissingAudio(_))));
    }
}
