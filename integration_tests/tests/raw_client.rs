mod common;

use anyhow::{bail, Context};
use futures::{SinkExt, StreamExt};
use sim_runtime::{decode_snapshot_json, encode_client_message_json, ClientMessage, Snapshot};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_snapshot(socket: &mut Socket) -> anyhow::Result<Snapshot> {
    common::within("a snapshot frame", async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok::<_, anyhow::Error>(decode_snapshot_json(&text)?)
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
                None => bail!("server closed the connection"),
            }
        }
    })
    .await?
}

async fn send(socket: &mut Socket, message: &ClientMessage) -> anyhow::Result<()> {
    socket
        .send(Message::Text(encode_client_message_json(message)?))
        .await
        .context("send command")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshots_assert_control_state() -> anyhow::Result<()> {
    let server = common::spawn_server().await?;
    let (mut socket, _) = connect_async(server.endpoint()).await?;

    let snapshot = next_snapshot(&mut socket).await?;
    assert_eq!(snapshot.paused, Some(false));
    assert_eq!(snapshot.molecule_limit, Some(1000));
    assert!(snapshot.timestep >= 1);

    let later = next_snapshot(&mut socket).await?;
    assert!(later.timestep > snapshot.timestep);
    for molecule in &later.molecules {
        assert!((0.0..=1.0).contains(&molecule.x));
        assert!((0.0..=1.0).contains(&molecule.y));
        assert!(molecule.colour.is_some());
    }

    socket.close(None).await?;
    server.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_freezes_timestep_and_limit_is_applied() -> anyhow::Result<()> {
    let server = common::spawn_server().await?;
    let (mut socket, _) = connect_async(server.endpoint()).await?;
    next_snapshot(&mut socket).await?;

    socket.send(Message::Text("not a command".into())).await?;
    send(&mut socket, &ClientMessage::Pause).await?;
    send(&mut socket, &ClientMessage::SetMoleculeLimit { value: 1500 }).await?;

    let paused = loop {
        let snapshot = next_snapshot(&mut socket).await?;
        if snapshot.paused == Some(true) && snapshot.molecule_limit == Some(1500) {
            break snapshot;
        }
    };
    for _ in 0..3 {
        let snapshot = next_snapshot(&mut socket).await?;
        assert_eq!(snapshot.paused, Some(true));
        assert_eq!(snapshot.timestep, paused.timestep);
    }

    send(&mut socket, &ClientMessage::Resume).await?;
    let resumed = loop {
        let snapshot = next_snapshot(&mut socket).await?;
        if snapshot.paused == Some(false) {
            break snapshot;
        }
    };
    assert!(resumed.timestep > paused.timestep);

    socket.close(None).await?;
    server.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_restarts_the_timeline() -> anyhow::Result<()> {
    let server = common::spawn_server().await?;
    let (mut socket, _) = connect_async(server.endpoint()).await?;
    loop {
        if next_snapshot(&mut socket).await?.timestep >= 20 {
            break;
        }
    }

    send(
        &mut socket,
        &ClientMessage::Reset {
            molecule_limit: Some(50),
            spawn_rate: None,
            variation: None,
            seed: Some(3),
        },
    )
    .await?;
    let snapshot = loop {
        let snapshot = next_snapshot(&mut socket).await?;
        if snapshot.molecule_limit == Some(50) {
            break snapshot;
        }
    };
    assert!(snapshot.timestep < 20, "timestep {}", snapshot.timestep);

    socket.close(None).await?;
    let summary = server.shutdown().await?;
    assert!(summary.total_molecules <= 2 * 49);
    Ok(())
}
