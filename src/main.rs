use clap::Parser;
use ftpsum::checksum::{ChecksumClient, ChecksumKind};
use ftpsum::client::FtpClient;

/// Ask an FTP server for the checksum of a remote file.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Remote file to checksum.
    #[arg(env = "FTP_TEST_PATHNAME")]
    pathname: String,

    /// Checksum command: MD5, XMD5, XCRC, XSHA, XSHA1, XSHA256 or XSHA512.
    #[arg(short, long, default_value = "MD5")]
    command: ChecksumKind,

    #[arg(long, env = "FTP_HOST")]
    host: String,

    #[arg(long, env = "FTP_PORT", default_value_t = 21)]
    port: u16,

    #[arg(short, long, env = "FTP_USER", default_value = "anonymous")]
    user: String,

    #[arg(long, env = "FTP_PASS", default_value = "anonymous", hide_env_values = true)]
    pass: String,

    /// Warn if the server does not advertise the command in FEAT.
    #[arg(long)]
    check_feat: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut client = FtpClient::connect((cli.host.as_str(), cli.port)).await?;
    client.login(&cli.user, &cli.pass).await?;

    if cli.check_feat && !client.has_feature(cli.command.token()).await? {
        log::warn!("server does not advertise {}", cli.command);
    }

    let mut sums = ChecksumClient::new(client);
    let result = sums.checksum(&cli.pathname, cli.command).await;
    sums.into_inner().quit().await?;

    println!("{}  {}", result?, cli.pathname);
    Ok(())
}
