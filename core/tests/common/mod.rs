// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use chrono::{DateTime, TimeZone, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sheethub::artifact::MemoryArtifactStore;
use sheethub::gateway::MockPaymentGateway;
use sheethub::{
  ArtifactKey, ArtifactStore, DeliveryService, ImageWatermarker, ManualClock, Membership, Money, NewSheet, Order,
  OrderLedger, PageDocument, PurchaseCompleted, QueueNotifier, SettlementConfig, Sheet, UrlSigner, User,
  WatermarkError, Watermarker,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Level;
use uuid::Uuid;

pub const LINK_SECRET: &[u8] = b"integration-test-link-secret";
pub const LINK_BASE: &str = "https://downloads.sheethub.test/artifacts";

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub fn start_time() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn dollars(minor_units: i64) -> Money {
  Money::from_minor(minor_units)
}

pub fn pct(text: &str) -> Decimal {
  text.parse().unwrap()
}

/// Settlement config with fast retries for tests.
pub fn test_config() -> SettlementConfig {
  SettlementConfig {
    gateway_retry_backoff: Duration::from_millis(1),
    ..SettlementConfig::default()
  }
}

pub fn test_signer() -> UrlSigner {
  UrlSigner::new(LINK_SECRET.to_vec(), LINK_BASE).unwrap()
}

// --- Document builders ---

pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
  let page = RgbaImage::from_pixel(width, height, Rgba(color));
  let mut bytes = Vec::new();
  page.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
  bytes
}

pub fn white_page() -> Vec<u8> {
  solid_png(24, 32, [255, 255, 255, 255])
}

pub fn red_watermark() -> Vec<u8> {
  solid_png(4, 4, [255, 0, 0, 255])
}

/// A master document of `pages` blank pages.
pub fn master_document(pages: usize) -> Vec<u8> {
  PageDocument::from_pages((0..pages).map(|_| white_page()).collect())
    .encode()
    .unwrap()
}

// --- Test doubles ---

type ApplyHook = Box<dyn FnOnce() + Send>;

/// Wraps the real watermarker with an invocation counter, an optional delay,
/// a switch to make every call fail and a one-shot hook run inside the next
/// transform.
#[derive(Default)]
pub struct CountingWatermarker {
  inner: ImageWatermarker,
  calls: AtomicUsize,
  failing: AtomicBool,
  delay: Option<Duration>,
  before_next_apply: Mutex<Option<ApplyHook>>,
}

impl CountingWatermarker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delay(delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Self::default()
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Runs `hook` on the blocking thread at the start of the next `apply`.
  pub fn before_next_apply(&self, hook: impl FnOnce() + Send + 'static) {
    *self.before_next_apply.lock() = Some(Box::new(hook));
  }
}

impl Watermarker for CountingWatermarker {
  fn apply(&self, master: &[u8], watermark: &[u8]) -> Result<Vec<u8>, WatermarkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let hook = self.before_next_apply.lock().take();
    if let Some(hook) = hook {
      hook();
    }
    if let Some(delay) = self.delay {
      std::thread::sleep(delay); // Runs on the blocking pool
    }
    if self.failing.load(Ordering::SeqCst) {
      return Err(WatermarkError::EmptyDocument);
    }
    self.inner.apply(master, watermark)
  }
}

// --- Wiring ---

pub struct Harness {
  pub clock: ManualClock,
  pub gateway: Arc<MockPaymentGateway>,
  pub events: UnboundedReceiver<PurchaseCompleted>,
  pub store: Arc<MemoryArtifactStore>,
  pub watermarker: Arc<CountingWatermarker>,
  pub ledger: Arc<OrderLedger>,
  pub delivery: Arc<DeliveryService>,
}

impl Harness {
  pub fn new() -> Self {
    Self::build(test_config(), MockPaymentGateway::new(), CountingWatermarker::new())
  }

  pub fn with_config(config: SettlementConfig) -> Self {
    Self::build(config, MockPaymentGateway::new(), CountingWatermarker::new())
  }

  pub fn with_gateway(gateway: MockPaymentGateway) -> Self {
    Self::build(test_config(), gateway, CountingWatermarker::new())
  }

  pub fn with_watermarker(watermarker: CountingWatermarker) -> Self {
    Self::build(test_config(), MockPaymentGateway::new(), watermarker)
  }

  pub fn build(config: SettlementConfig, gateway: MockPaymentGateway, watermarker: CountingWatermarker) -> Self {
    setup_tracing();
    let clock = ManualClock::new(start_time());
    let gateway = Arc::new(gateway);
    let (notifier, events) = QueueNotifier::new();
    let store = Arc::new(MemoryArtifactStore::new(test_signer(), Arc::new(clock.clone())));
    let watermarker = Arc::new(watermarker);

    let ledger = Arc::new(
      OrderLedger::new(config, gateway.clone(), Arc::new(notifier)).with_clock(Arc::new(clock.clone())),
    );
    let delivery = Arc::new(DeliveryService::new(
      ledger.clone(),
      store.clone(),
      watermarker.clone(),
      red_watermark(),
    ));

    Self {
      clock,
      gateway,
      events,
      store,
      watermarker,
      ledger,
      delivery,
    }
  }

  pub fn creator(&self, royalty_percentage: &str, membership: Membership) -> User {
    let user = User::new(
      format!("{}@creators.test", Uuid::new_v4().simple()),
      pct(royalty_percentage),
      membership,
    );
    self.ledger.register_creator(user).unwrap()
  }

  /// Stores a two-page master and publishes a sheet pointing at it.
  pub async fn sheet(&self, creator: &User, price: Money) -> Sheet {
    self.sheet_with_assets(creator, price, Vec::new()).await
  }

  pub async fn sheet_with_assets(&self, creator: &User, price: Money, assets: Vec<ArtifactKey>) -> Sheet {
    let master = ArtifactKey::new(format!("sheets/{}/master.pages", Uuid::new_v4().simple())).unwrap();
    self.store.put(&master, master_document(2)).await.unwrap();
    for asset in &assets {
      self.store.put(asset, b"supplementary".to_vec()).await.unwrap();
    }
    self
      .ledger
      .publish_sheet(NewSheet {
        creator_id: creator.id,
        title: "Nocturne in E-flat".to_string(),
        price,
        master,
        assets,
      })
      .unwrap()
  }

  /// Replaces a sheet's master after moving the clock forward.
  pub async fn touch_master(&self, sheet: &Sheet) {
    self.clock.advance(chrono::Duration::seconds(5));
    self.store.put(&sheet.master, master_document(2)).await.unwrap();
  }

  pub async fn completed_order(&self, buyer_id: Uuid, sheet: &Sheet) -> Order {
    let order = self.ledger.create_order(buyer_id, sheet.id).unwrap();
    let reference = format!("AP-{}", order.id.simple());
    self.ledger.complete_purchase(order.id, &reference).await.unwrap()
  }

  pub fn drain_events(&mut self) -> Vec<PurchaseCompleted> {
    let mut drained = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      drained.push(event);
    }
    drained
  }
}
