//! Stream-backed RouterOS API client.

use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::sync::Mutex;

use super::{ApiClient, ApiError, Record, Reply, proto};

/// Byte stream a [`Client`] can run over (plain TCP or TLS).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// RouterOS API client over a single stream.
///
/// Commands are executed one at a time; concurrent callers queue on the
/// stream lock. If a command is dropped before its `!done` arrives, the
/// rest of its reply is still in the stream and every later command fails
/// with a transport error, so the owner redials instead of reading it.
pub struct Client {
    channel: Mutex<Channel>,
}

struct Channel {
    stream: BufStream<Box<dyn Transport>>,
    /// Set from the request write until its reply is fully read.
    pending: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Wrap an established stream. No I/O is performed.
    pub fn new<T: Transport + 'static>(stream: T) -> Self {
        let boxed: Box<dyn Transport> = Box::new(stream);
        Self {
            channel: Mutex::new(Channel {
                stream: BufStream::new(boxed),
                pending: false,
            }),
        }
    }

    /// Authenticate with plaintext credentials (RouterOS 6.43+).
    ///
    /// A `!trap` reply means the credentials were rejected. A reply carrying
    /// a challenge (`ret`) comes from the legacy MD5 login, which is refused.
    pub async fn login(&self, user: &str, password: &str) -> Result<(), ApiError> {
        let name = format!("=name={user}");
        let password = format!("=password={password}");
        let reply = self.execute(&["/login", &name, &password]).await?;

        if reply.ret().is_some() {
            return Err(ApiError::Protocol(
                "device requested legacy challenge login, which is not supported".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, words: &[&str]) -> Result<Reply, ApiError> {
        let mut channel = self.channel.lock().await;
        if channel.pending {
            return Err(ApiError::Protocol(
                "previous command was interrupted, stream is out of sync".to_string(),
            ));
        }
        channel.pending = true;
        let stream = &mut channel.stream;
        proto::write_sentence(&mut *stream, words).await?;

        let mut reply = Reply::default();
        let mut trap: Option<String> = None;

        loop {
            let sentence = proto::read_sentence(&mut *stream).await?;
            let Some((kind, attrs)) = sentence.split_first() else {
                continue;
            };

            match kind.as_str() {
                "!re" => reply.re.push(parse_attributes(attrs)),
                "!done" => {
                    reply.done = parse_attributes(attrs);
                    break;
                }
                "!trap" => {
                    let mut fields = parse_attributes(attrs);
                    trap = Some(
                        fields
                            .remove("message")
                            .unwrap_or_else(|| "unknown error".to_string()),
                    );
                }
                "!fatal" => return Err(ApiError::Fatal(attrs.join(" "))),
                "!empty" => {}
                other => {
                    return Err(ApiError::Protocol(format!(
                        "unexpected reply word '{other}'"
                    )));
                }
            }
        }

        channel.pending = false;
        match trap {
            Some(message) => Err(ApiError::Trap(message)),
            None => Ok(reply),
        }
    }
}

#[async_trait::async_trait]
impl ApiClient for Client {
    async fn run(&self, command: &str, args: &[&str]) -> Result<Reply, ApiError> {
        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(command);
        words.extend_from_slice(args);
        self.execute(&words).await
    }
}

/// Turn `=key=value` words into a record; other words are ignored.
fn parse_attributes(words: &[String]) -> Record {
    words
        .iter()
        .filter_map(|word| word.strip_prefix('='))
        .map(|attr| match attr.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (attr.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::oneshot;

    /// Minimal device: answers each request from a fixed script.
    async fn serve(mut stream: DuplexStream, script: Vec<(Vec<&'static str>, Vec<Vec<&'static str>>)>) {
        for (expected, responses) in script {
            let request = proto::read_sentence(&mut stream).await.unwrap();
            assert_eq!(request, expected);
            for sentence in responses {
                proto::write_sentence(&mut stream, &sentence).await.unwrap();
            }
        }
    }

    #[test]
    fn test_parse_attributes() {
        let words = vec![
            "=name=ether1".to_string(),
            "=.id=*1".to_string(),
            "=comment=a=b".to_string(),
            "=disabled".to_string(),
            ".tag=3".to_string(),
        ];
        let record = parse_attributes(&words);
        assert_eq!(record["name"], "ether1");
        assert_eq!(record[".id"], "*1");
        assert_eq!(record["comment"], "a=b");
        assert_eq!(record["disabled"], "");
        assert_eq!(record.len(), 4);
    }

    #[tokio::test]
    async fn test_login_and_run() {
        let (local, remote) = tokio::io::duplex(4096);
        let device = tokio::spawn(serve(
            remote,
            vec![
                (
                    vec!["/login", "=name=admin", "=password=secret"],
                    vec![vec!["!done"]],
                ),
                (
                    vec!["/interface/print", "=.proplist=name"],
                    vec![
                        vec!["!re", "=name=ether1"],
                        vec!["!re", "=name=ether2"],
                        vec!["!done"],
                    ],
                ),
                (
                    vec!["/ip/route/print", "=count-only="],
                    vec![vec!["!done", "=ret=42"]],
                ),
            ],
        ));

        let client = Client::new(local);
        client.login("admin", "secret").await.unwrap();

        let reply = client
            .run("/interface/print", &["=.proplist=name"])
            .await
            .unwrap();
        assert_eq!(reply.re.len(), 2);
        assert_eq!(reply.re[1]["name"], "ether2");

        let reply = client.run("/ip/route/print", &["=count-only="]).await.unwrap();
        assert_eq!(reply.ret(), Some("42"));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (local, remote) = tokio::io::duplex(4096);
        let device = tokio::spawn(serve(
            remote,
            vec![(
                vec!["/login", "=name=admin", "=password=wrong"],
                vec![
                    vec!["!trap", "=message=invalid user name or password (6)"],
                    vec!["!done"],
                ],
            )],
        ));

        let client = Client::new(local);
        let err = client.login("admin", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Trap(ref m) if m.contains("invalid user name")));
        assert!(!err.is_transport());

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_login_refused() {
        let (local, remote) = tokio::io::duplex(4096);
        let device = tokio::spawn(serve(
            remote,
            vec![(
                vec!["/login", "=name=admin", "=password=secret"],
                vec![vec!["!done", "=ret=ebddd18303a54111e2dea05a92ab46b4"]],
            )],
        ));

        let client = Client::new(local);
        assert!(matches!(
            client.login("admin", "secret").await,
            Err(ApiError::Protocol(_))
        ));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_is_transport_error() {
        let (local, remote) = tokio::io::duplex(4096);
        drop(remote);

        let client = Client::new(local);
        let err = client.run("/system/identity/print", &[]).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_fatal_reply() {
        let (local, remote) = tokio::io::duplex(4096);
        let device = tokio::spawn(serve(
            remote,
            vec![(
                vec!["/quit"],
                vec![vec!["!fatal", "session terminated on request"]],
            )],
        ));

        let client = Client::new(local);
        let err = client.run("/quit", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Fatal(ref m) if m.contains("terminated")));
        assert!(err.is_transport());

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_command_poisons_client() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let (release, released) = oneshot::channel::<()>();
        let device = tokio::spawn(async move {
            let request = proto::read_sentence(&mut remote).await.unwrap();
            assert_eq!(request, vec!["/system/resource/print"]);
            released.await.unwrap();
            proto::write_sentence(&mut remote, &["!re", "=cpu-load=7"])
                .await
                .unwrap();
            proto::write_sentence(&mut remote, &["!done"]).await.unwrap();
            remote
        });

        let client = Client::new(local);
        let first = tokio::time::timeout(
            Duration::from_millis(20),
            client.run("/system/resource/print", &[]),
        )
        .await;
        assert!(first.is_err(), "command should still be waiting for its reply");

        // The stale reply lands in the stream after the caller gave up.
        release.send(()).unwrap();
        let _remote = device.await.unwrap();

        let err = client.run("/system/identity/print", &[]).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
        assert!(matches!(err, ApiError::Protocol(ref m) if m.contains("interrupted")));
    }

    #[tokio::test]
    async fn test_trap_keeps_client_usable() {
        let (local, remote) = tokio::io::duplex(4096);
        let device = tokio::spawn(serve(
            remote,
            vec![
                (
                    vec!["/interface/lte/print"],
                    vec![vec!["!trap", "=message=no such command prefix"], vec!["!done"]],
                ),
                (
                    vec!["/system/identity/print"],
                    vec![vec!["!re", "=name=core1"], vec!["!done"]],
                ),
            ],
        ));

        let client = Client::new(local);
        let err = client.run("/interface/lte/print", &[]).await.unwrap_err();
        assert!(!err.is_transport());

        let reply = client.run("/system/identity/print", &[]).await.unwrap();
        assert_eq!(reply.re[0]["name"], "core1");

        device.await.unwrap();
    }
}
