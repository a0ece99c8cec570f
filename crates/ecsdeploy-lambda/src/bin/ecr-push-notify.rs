// Posts a Deploy/Cancel prompt to Slack for each successful ECR push

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    ecsdeploy_lambda::run_notifier().await
}
