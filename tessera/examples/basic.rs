//! Wires a small application: a config, a connection pool with start/stop
//! hooks, two caches told apart by qualifier, and a pair of services that
//! reference each other through fields.
//!
//! Run with `RUST_LOG=tessera_container=debug` to watch the container work.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tessera::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Config {
    database_url: String,
}

struct Pool {
    url: String,
}

impl Pool {
    fn open(&self) -> Result<()> {
        info!(url = %self.url, "Pool opened");
        Ok(())
    }

    fn drain(&self) -> Result<()> {
        info!("Pool drained");
        Ok(())
    }
}

trait Cache: Send + Sync {
    fn describe(&self) -> String;
}

struct MemoryCache;
impl Cache for MemoryCache {
    fn describe(&self) -> String {
        "in-memory".into()
    }
}

struct DiskCache;
impl Cache for DiskCache {
    fn describe(&self) -> String {
        "on-disk".into()
    }
}

struct Orders {
    pool: Arc<Pool>,
    cache: Arc<dyn Cache>,
    billing: OnceCell<Arc<Billing>>,
}

struct Billing {
    orders: OnceCell<Arc<Orders>>,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let container = Container::builder()
        .component(ComponentRecord::of::<Config>("config").recipe(ConstructionRecipe::no_args(|| Config {
            database_url: "postgres://localhost/shop".into(),
        })))
        .component(
            ComponentRecord::of::<Pool>("pool")
                .recipe(ConstructionRecipe::new(vec![DependencyRequirement::of::<Config>()], |args| {
                    let config: Arc<Config> = args.instance()?;
                    Ok(Pool {
                        url: config.database_url.clone(),
                    })
                }))
                .on_init("open", Pool::open)
                .on_destroy("drain", Pool::drain),
        )
        .component(
            ComponentRecord::of::<MemoryCache>("memoryCache")
                .exposes(|c: Arc<MemoryCache>| c as Arc<dyn Cache>)
                .qualifier("tier", "fast")
                .recipe(ConstructionRecipe::no_args(|| MemoryCache)),
        )
        .component(
            ComponentRecord::of::<DiskCache>("diskCache")
                .exposes(|c: Arc<DiskCache>| c as Arc<dyn Cache>)
                .qualifier("tier", "slow")
                .recipe(ConstructionRecipe::no_args(|| DiskCache)),
        )
        .component(
            ComponentRecord::of::<Orders>("orders")
                .recipe(ConstructionRecipe::new(
                    vec![
                        DependencyRequirement::of::<Pool>(),
                        DependencyRequirement::of::<dyn Cache>().qualified("tier", "fast"),
                    ],
                    |args| {
                        Ok(Orders {
                            pool: args.instance()?,
                            cache: args.instance()?,
                            billing: OnceCell::new(),
                        })
                    },
                ))
                .field(FieldInjection::one("billing", |o: &Orders, b: Arc<Billing>| {
                    let _ = o.billing.set(b);
                })),
        )
        .component(
            ComponentRecord::of::<Billing>("billing")
                .recipe(ConstructionRecipe::no_args(|| Billing { orders: OnceCell::new() }))
                .field(FieldInjection::one("orders", |b: &Billing, o: Arc<Orders>| {
                    let _ = b.orders.set(o);
                })),
        )
        .build()?;

    container.refresh()?;

    let orders: Arc<Orders> = container.resolve()?;
    info!(pool = %orders.pool.url, cache = %orders.cache.describe(), "Orders ready");

    let round_trip = orders
        .billing
        .get()
        .and_then(|billing| billing.orders.get())
        .is_some_and(|back| Arc::ptr_eq(back, &orders));
    info!(round_trip, "orders -> billing -> orders");

    let caches: Vec<Arc<dyn Cache>> = container.resolve_all()?;
    for cache in &caches {
        info!(cache = %cache.describe(), "Cache registered");
    }

    info!(ready = ?container.ready_components(), "Ready order");
    container.close()?;
    Ok(())
}
