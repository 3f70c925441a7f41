use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::info;

use crate::session::{SessionEnd, SessionError, ViewerSession};

/// Text frames of a WebSocket as session input. Control frames are skipped and
/// a close frame ends the stream with [`SessionError::ClosedByPeer`].
pub fn inbound_frames<S>(stream: S) -> impl Stream<Item = Result<String, SessionError>>
where
    S: Stream<Item = Result<Message, WsError>>,
{
    stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(text)),
            Ok(Message::Close(_)) => Some(Err(SessionError::ClosedByPeer)),
            Ok(_) => None,
            Err(err) => Some(Err(SessionError::from(err))),
        })
    })
}

pub fn outbound_frames<S>(sink: S) -> impl Sink<String, Error = SessionError>
where
    S: Sink<Message, Error = WsError>,
{
    sink.sink_map_err(SessionError::WebSocket)
        .with(|text: String| future::ready(Ok::<_, SessionError>(Message::Text(text))))
}

/// Connect to `endpoint` and run the session over it until it ends.
pub async fn run_websocket_session(
    session: &mut ViewerSession,
    endpoint: &str,
) -> Result<SessionEnd, SessionError> {
    let (stream, _response) = tokio_tungstenite::connect_async(endpoint).await?;
    info!(target: "petri::viewer", endpoint, "session.connected");
    let (sink, source) = stream.split();
    session
        .run(inbound_frames(source), outbound_frames(sink))
        .await
}
