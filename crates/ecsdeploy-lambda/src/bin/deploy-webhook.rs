// Slack interactive-message webhook behind API Gateway
//
// Build with: cargo lambda build --release -p ecsdeploy-lambda --bin deploy-webhook

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    ecsdeploy_lambda::run_webhook().await
}
