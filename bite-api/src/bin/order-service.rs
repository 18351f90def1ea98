use bite_core::ServiceKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bite_api::server::run(ServiceKind::Order).await
}
