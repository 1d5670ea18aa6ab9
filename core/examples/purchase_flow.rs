// sheethub/examples/purchase_flow.rs

use image::{ImageFormat, Rgba, RgbaImage};
use rust_decimal::Decimal;
use sheethub::artifact::MemoryArtifactStore;
use sheethub::gateway::{MockOutcome, MockPaymentGateway};
use sheethub::{
  ArtifactKey, ArtifactStore, DeliveryService, GatewayError, ImageWatermarker, Membership, Money, NewSheet,
  OrderLedger, PageDocument, QueueNotifier, SettlementConfig, SheetHubError, UrlSigner, User,
};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

fn png(width: u32, height: u32, color: [u8; 4]) -> Result<Vec<u8>, SheetHubError> {
  let mut bytes = Vec::new();
  RgbaImage::from_pixel(width, height, Rgba(color))
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .map_err(|e| SheetHubError::Internal(e.to_string()))?;
  Ok(bytes)
}

#[tokio::main]
async fn main() -> Result<(), SheetHubError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Purchase Flow Example ---");

  // 1. Collaborators: a scripted processor, an in-memory store, a mail queue.
  let gateway = Arc::new(MockPaymentGateway::new());
  gateway.script(
    "AP-declined",
    vec![MockOutcome::Fail(GatewayError::Declined {
      reason: "card expired".to_string(),
    })],
  );
  let signer = UrlSigner::new(b"example-secret".to_vec(), "http://127.0.0.1:8080/artifacts")?;
  let store = Arc::new(MemoryArtifactStore::new(signer, sheethub::core::system_clock()));
  let (notifier, mut mail_queue) = QueueNotifier::new();

  let ledger = Arc::new(OrderLedger::new(SettlementConfig::default(), gateway, Arc::new(notifier)));
  let delivery = DeliveryService::new(
    ledger.clone(),
    store.clone(),
    Arc::new(ImageWatermarker::with_margin(4)),
    png(16, 8, [180, 0, 0, 160])?,
  );

  // 2. A creator publishes a sheet.
  let creator = ledger.register_creator(User::new("composer@example.com", Decimal::new(7, 1), Membership::Basic))?;
  let master = ArtifactKey::new("sheets/moonlight/master.pages")?;
  let pages = vec![png(120, 160, [255, 255, 255, 255])?, png(120, 160, [250, 250, 240, 255])?];
  store
    .put(&master, PageDocument::from_pages(pages).encode()?)
    .await?;
  let sheet = ledger.publish_sheet(NewSheet {
    creator_id: creator.id,
    title: "Moonlight Sonata, 1st mvt.".to_string(),
    price: Money::from_minor(1000),
    master,
    assets: Vec::new(),
  })?;

  // 3. A buyer pays and downloads.
  let buyer = Uuid::new_v4();
  let order = ledger.create_order(buyer, sheet.id)?;
  let order = ledger.complete_purchase(order.id, "AP-paid").await?;
  let link = delivery.get_download_link(order.id, buyer).await?;
  info!(url = %link.url, expires_at = %link.expires_at, "Buyer can download.");

  let split = ledger.sale_split(order.id)?;
  info!(
    royalty = %split.royalty,
    commission = %split.commission,
    fee = %split.processor_fee,
    "Sale split."
  );

  while let Ok(event) = mail_queue.try_recv() {
    info!(order_id = %event.order_id, "Receipt and creator notice queued.");
  }

  // 4. A second buyer's payment is declined.
  let unlucky = Uuid::new_v4();
  let declined = ledger.create_order(unlucky, sheet.id)?;
  if let Err(e) = ledger.complete_purchase(declined.id, "AP-declined").await {
    warn!("Second purchase failed: {}", e);
  }
  if let Err(e) = delivery.get_download_link(declined.id, unlucky).await {
    warn!("No link for the declined order: {}", e);
  }

  let summary = ledger.sales_summary(sheet.id)?;
  info!(
    sold = summary.completed_orders,
    total = %summary.total_sales,
    earnings = %summary.total_earnings,
    "Sales summary."
  );

  Ok(())
}
