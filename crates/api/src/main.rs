#[tokio::main]
async fn main() {
    acopio_observability::init();

    let settings = acopio_infra::settings::Settings::from_env();
    let http_addr = settings.http_addr.clone();

    let app = acopio_api::app::build_app(settings).await;

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {http_addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
