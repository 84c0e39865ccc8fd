use super::status::*;
use super::*;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A complete server reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    /// Status code taken from the first line.
    pub code: u16,
    /// Every reply line as received, joined with `\n`.
    pub text: String,
    /// Set when the status is 4xx or 5xx.
    pub is_error: bool,
}

impl ServerReply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        ServerReply {
            code,
            text: text.into(),
            is_error: code >= FIRST_ERROR,
        }
    }

    /// Final line of the reply, where servers put the payload.
    pub fn last_line(&self) -> &str {
        last_line(&self.text)
    }
}

/// Final line of raw reply text, ignoring a trailing line break.
pub(crate) fn last_line(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
        .rsplit('\n')
        .next()
        .unwrap_or_default()
        .trim_end_matches('\r')
}

/// Sends one command line and hands back the reply to it.
///
/// Implementations must pair each call with exactly one reply; FTP control
/// connections are half-duplex, so a second command may only go out once the
/// previous reply has been read in full.
#[async_trait]
pub trait Transport: Send {
    /// Send `command` (without line terminator) and wait for the reply.
    ///
    /// # Errors
    /// Socket failures and unreadable replies. A reply carrying a 4xx/5xx
    /// status is still returned as `Ok`, flagged with `is_error`.
    async fn raw(&mut self, command: &str) -> Result<ServerReply>;
}

pub struct FtpClient<S = TcpStream> {
    reader: BufReader<S>,
}

impl FtpClient<TcpStream> {
    /// Open a FTP connection
    ///
    /// # Arguments
    /// address     Server address to connect
    ///
    /// # Example
    /// ```no_run
    /// # use ftpsum::client::FtpClient;
    /// # async fn run() -> ftpsum::Result<()> {
    /// let mut client = FtpClient::connect("127.0.0.1:21").await?;
    /// client.login("user", "password").await?;
    /// client.quit().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(address: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| FtpError::ConnectionError(format!("Could not open connection: {}", e)))?;
        Self::from_stream(stream).await
    }
}

impl<S> FtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open control stream and consume the greeting.
    ///
    /// # Errors
    /// ConnectionError if the server does not greet with 220.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = FtpClient {
            reader: BufReader::new(stream),
        };

        let greeting = client.parse_response().await?;
        if greeting.code != SERVICE_READY {
            return Err(FtpError::ConnectionError(format!(
                "Server not ready for connections: {}",
                greeting.text
            )));
        }
        Ok(client)
    }

    /// Perform Login to server.
    /// # Arguments
    /// username    username for login
    /// password    password for given user
    ///
    /// # Errors
    /// May return LoginError if login is not successful.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        // send username
        let response = self.write_cmd(&format!("USER {}", username)).await?;
        match response.code {
            LOGGED_IN => return Ok(()),
            NEED_PASSWORD => {}
            _ => {
                return Err(FtpError::LoginError(format!(
                    "Could not authenticate: {}",
                    response.text
                )))
            }
        }

        // send password
        let response = self.write_cmd(&format!("PASS {}", password)).await?;
        if response.code != LOGGED_IN {
            return Err(FtpError::LoginError(format!(
                "Invalid username/password combination: {}",
                response.text
            )));
        }

        Ok(())
    }

    /// Write a command to the server and read the full reply.
    /// # Arguments
    /// command     text command to be sent to server, without CRLF
    /// # Errors
    /// Errors when failing to write to server or to parse a response.
    pub async fn write_cmd(&mut self, command: &str) -> Result<ServerReply> {
        if command.starts_with("PASS ") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", command);
        }

        let stream = self.reader.get_mut();
        stream.write_all(format!("{}\r\n", command).as_bytes()).await?;
        stream.flush().await?;
        self.parse_response().await
    }

    /// Ask the server which extensions it supports (RFC 2389).
    ///
    /// Returns the advertised feature lines, trimmed and uppercased. Servers
    /// that do not know FEAT at all yield an empty list.
    pub async fn features(&mut self) -> Result<Vec<String>> {
        let reply = self.write_cmd("FEAT").await?;
        if reply.code >= FIRST_PERMANENT_ERROR {
            return Ok(Vec::new());
        }
        if reply.is_error {
            return Err(FtpError::Rejected {
                code: reply.code,
                text: reply.text,
            });
        }

        let continuation = format!("{}-", reply.code);
        let lines: Vec<&str> = reply.text.lines().collect();
        if lines.len() < 3 {
            return Ok(Vec::new());
        }
        Ok(lines[1..lines.len() - 1]
            .iter()
            .copied()
            .map(|line| line.strip_prefix(continuation.as_str()).unwrap_or(line))
            .map(|line| line.trim().to_uppercase())
            .filter(|line| !line.is_empty())
            .collect())
    }

    /// Whether FEAT lists `name` (compared against each feature's first word).
    pub async fn has_feature(&mut self, name: &str) -> Result<bool> {
        let wanted = name.to_uppercase();
        Ok(self
            .features()
            .await?
            .iter()
            .any(|feat| feat.split_whitespace().next() == Some(wanted.as_str())))
    }

    /// Close the session politely.
    pub async fn quit(&mut self) -> Result<()> {
        let response = self.write_cmd("QUIT").await?;
        if response.code != SERVICE_CLOSING {
            return Err(FtpError::CommandError(format!(
                "Unexpected reply to QUIT: {}",
                response.text
            )));
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(FtpError::ConnectionError("Server closed connection".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// reads a complete (possibly multi-line) reply
    async fn parse_response(&mut self) -> Result<ServerReply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let multiline = first.as_bytes().get(3) == Some(&b'-');
        let mut lines = vec![first];

        // "NNN-" opens a block that runs until a line starting "NNN "
        if multiline {
            let terminator = format!("{} ", code);
            let bare = code.to_string();
            loop {
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == bare;
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let reply = ServerReply::new(code, lines.join("\n"));
        log::trace!("<<< {}", reply.text);
        Ok(reply)
    }
}

#[async_trait]
impl<S> Transport for FtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn raw(&mut self, command: &str) -> Result<ServerReply> {
        self.write_cmd(command).await
    }
}

fn parse_code(line: &str) -> Result<u16> {
    line.get(0..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| {
            FtpError::ResponseError(format!("Invalid response code from server: {}", line))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    /// Plays the server side: greets, then expects each command in turn and
    /// answers it with the paired raw reply.
    fn fake_server(
        greeting: &'static str,
        script: Vec<(&'static str, &'static str)>,
    ) -> (DuplexStream, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            write.write_all(greeting.as_bytes()).await.unwrap();
            for (expected, reply) in script {
                let line = lines.next_line().await.unwrap().unwrap();
                assert_eq!(line, expected);
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        (client, handle)
    }

    #[test]
    fn last_line_ignores_preamble() {
        let reply = ServerReply::new(250, "250-Computing MD5 digest\n250 ABCDEF\n");
        assert_eq!(reply.last_line(), "250 ABCDEF");
        assert!(!reply.is_error);
        assert!(ServerReply::new(502, "502 nope").is_error);
    }

    #[test]
    fn bad_status_lines_are_rejected() {
        assert_eq!(parse_code("250 ok").unwrap(), 250);
        assert!(parse_code("25").is_err());
        assert!(parse_code("abc def").is_err());
        assert!(parse_code("+12 x").is_err());
    }

    #[tokio::test]
    async fn login_with_password() {
        let (stream, server) = fake_server(
            "220 Service ready\r\n",
            vec![
                ("USER demo", "331 Need password\r\n"),
                ("PASS secret", "230 Logged in\r\n"),
                ("QUIT", "221 Bye\r\n"),
            ],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        client.login("demo", "secret").await.unwrap();
        client.quit().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn login_refused() {
        let (stream, server) = fake_server(
            "220 Service ready\r\n",
            vec![
                ("USER demo", "331 Need password\r\n"),
                ("PASS wrong", "530 Not logged in\r\n"),
            ],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        let err = client.login("demo", "wrong").await.unwrap_err();
        assert!(matches!(err, FtpError::LoginError(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn greeting_must_be_service_ready() {
        let (stream, server) = fake_server("421 Too many users\r\n", vec![]);
        let err = FtpClient::from_stream(stream).await.err().unwrap();
        assert!(matches!(err, FtpError::ConnectionError(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn multiline_reply_is_kept_verbatim() {
        let (stream, server) = fake_server(
            "220-Welcome\r\n220-Second line\r\n220 Ready\r\n",
            vec![(
                "XMD5 myfile.txt",
                "250-Computing MD5 digest\r\n250 7F1EE68D2344001A050752B669242182\r\n",
            )],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        let reply = client.raw("XMD5 myfile.txt").await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(
            reply.text,
            "250-Computing MD5 digest\n250 7F1EE68D2344001A050752B669242182"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejection_is_a_flagged_reply() {
        let (stream, server) = fake_server(
            "220 Ready\r\n",
            vec![("XCRC myfile.txt", "500 'XCRC myfile.txt': command not understood\r\n")],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        let reply = client.raw("XCRC myfile.txt").await.unwrap();
        assert_eq!(reply.code, 500);
        assert!(reply.is_error);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn features_are_listed() {
        let feat = "211-Features:\r\n MDTM\r\n MD5\r\n XCRC \"filename\" SP EP\r\n xsha256\r\n211 End\r\n";
        let (stream, server) = fake_server(
            "220 Ready\r\n",
            vec![("FEAT", feat), ("FEAT", feat), ("FEAT", feat)],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        assert_eq!(
            client.features().await.unwrap(),
            vec!["MDTM", "MD5", "XCRC \"FILENAME\" SP EP", "XSHA256"]
        );
        assert!(client.has_feature("xcrc").await.unwrap());
        assert!(!client.has_feature("XSHA").await.unwrap());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn feat_unknown_means_no_features() {
        let (stream, server) = fake_server(
            "220 Ready\r\n",
            vec![("FEAT", "502 Command not implemented\r\n")],
        );
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        assert!(client.features().await.unwrap().is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_connection_is_a_connection_error() {
        let (stream, server) = fake_server("220 Ready\r\n", vec![]);
        let mut client = FtpClient::from_stream(stream).await.unwrap();
        server.await.unwrap();
        let err = client.raw("MD5 myfile.txt").await.unwrap_err();
        assert!(matches!(err, FtpError::ConnectionError(_)));
    }
}
