#[tokio::main]
async fn main() {
    if lib_richtext::init().await.is_err() {
        std::process::exit(1);
    }
}
