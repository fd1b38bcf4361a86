use clap::{arg, command, value_parser, ArgAction, Command};
use log::{error, info, LevelFilter};
use mqtt_waiter::{
    connection::{
        config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_PORT},
        BrokerConnection, Config, MqttBrokerConnection,
    },
    logging,
    service::BrokerRegistry,
    ConnectionWaiter, WaitConfig, EMBEDDED_CLIENT_ID,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    command!()
        .about("Connect to an MQTT broker and exit once the connection is up")
        .arg(
            arg!(-i --ip <"IP ADDRESS"> "IP Address of the broker")
                .action(ArgAction::Set)
                .value_parser(value_parser!(IpAddr)),
        )
        .arg(
            arg!(-p --port <"TCP/IP SOCKET"> "Port num the broker listens on")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(-c --"client-id" <"CLIENT ID"> "Client identifier to connect and wait for")
                .action(ArgAction::Set),
        )
        .arg(
            arg!(-k --"keep-alive" <"SECONDS"> "Keep alive interval. 0 disables pings")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(-u --username <"USERNAME"> "Username to authenticate with")
                .action(ArgAction::Set),
        )
        .arg(
            arg!(-P --password <"PASSWORD"> "Password to authenticate with")
                .action(ArgAction::Set)
                .requires("username"),
        )
        .arg(
            arg!(--"lookup-timeout" <"MILLISECONDS"> "Wait bound for the connection to be registered")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"state-timeout" <"MILLISECONDS"> "Wait bound for the connection to report CONNECTED")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"connect-timeout" <"MILLISECONDS"> "Bound on tcp connect and on CONNACK")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(-l --"log-level" <"LEVEL"> "Most verbose log level to emit")
                .action(ArgAction::Set)
                .value_parser(["off", "error", "warn", "info", "debug", "trace"]),
        )
        .arg(
            arg!(--"log-file" <"PATH"> "Also append log records to this file")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf)),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let flags = cli().get_matches();

    let level = flags
        .get_one::<String>("log-level")
        .and_then(|l| LevelFilter::from_str(l).ok())
        .unwrap_or(LevelFilter::Info);
    let log_file = flags.get_one::<PathBuf>("log-file");
    if let Err(err) = logging::init(level, log_file.map(|p| p.as_path())) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    let ip = flags
        .get_one::<IpAddr>("ip")
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let port = flags
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(DEFAULT_PORT);
    let client_id = flags
        .get_one::<String>("client-id")
        .cloned()
        .unwrap_or_else(|| EMBEDDED_CLIENT_ID.to_string());
    let millis = |name: &str| {
        flags
            .get_one::<u64>(name)
            .copied()
            .map(Duration::from_millis)
    };

    let mut config = Config::new(ip, port, client_id.as_str())
        .keep_alive(
            flags
                .get_one::<u16>("keep-alive")
                .copied()
                .unwrap_or(DEFAULT_KEEP_ALIVE),
        )
        .connect_timeout(millis("connect-timeout").unwrap_or(DEFAULT_CONNECT_TIMEOUT));
    if let Some(username) = flags.get_one::<String>("username") {
        config = config.credentials(
            username.as_str(),
            flags.get_one::<String>("password").map(|p| p.as_bytes().to_vec()),
        );
    }

    let defaults = WaitConfig::default();
    let wait_config = WaitConfig::new(
        millis("lookup-timeout").unwrap_or(defaults.lookup_timeout),
        millis("state-timeout").unwrap_or(defaults.state_timeout),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let registry = BrokerRegistry::new();
    let connection = MqttBrokerConnection::new(config);
    connection.start();
    registry.add_broker_connection(client_id.as_str(), connection.clone());

    let res = ConnectionWaiter::new(wait_config)
        .with_cancellation(cancel)
        .wait_for_connection(&registry, &client_id)
        .await;

    let status = match res {
        Ok(found) => {
            info!(
                "Connection {} is {}.",
                found.client_id(),
                found.connection_state()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    };

    connection.stop().await;
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn password_requires_username() {
        let err = cli()
            .try_get_matches_from(["mqtt-wait", "-P", "secret"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let flags = cli()
            .try_get_matches_from(["mqtt-wait", "-u", "user", "-P", "secret"])
            .expect("username and password together are accepted");
        assert_eq!(
            flags.get_one::<String>("password").map(String::as_str),
            Some("secret")
        );
    }
}
