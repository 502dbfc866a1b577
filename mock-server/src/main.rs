use tokio::net::TcpListener;

/// Serves the mock routes on `127.0.0.1:$PORT`. `PORT=0` picks a free port.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port: u16 = match std::env::var("PORT") {
        Ok(value) => value
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("PORT={value}: {e}")))?,
        Err(_) => 8080,
    };
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    println!("mock-server listening on http://{}", listener.local_addr()?);
    mock_server::run(listener).await
}
