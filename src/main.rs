#[tokio::main]
async fn main() {
    notify_backend::run().await;
}
