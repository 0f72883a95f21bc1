use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;

const ROUTES: &[&str] = &[
    "ANY  /echo",
    "GET  /json",
    "GET  /malformed-json",
    "GET  /bytes",
    "GET  /status/{code}",
    "GET  /slow/{ms}",
];

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port: u16 = match std::env::var("PORT") {
        Ok(raw) => raw.parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("PORT={raw} is not a port"))
        })?,
        Err(_) => 3000,
    };
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    println!("fixture listening on {}", listener.local_addr()?);
    for route in ROUTES {
        println!("  {route}");
    }
    mock_server::run(listener).await
}
