//! Typed cache of page objects.
//!
//! A [`PageFactory`] hands out one shared instance per page-object type for
//! the lifetime of a test. Page objects receive a [`PageContext`] when they
//! are built and use it to reach other pages, which is what lets an action
//! on one page return the next page in a chain:
//!
//! ```ignore
//! let home = factory
//!     .page::<LoginPage>()?
//!     .enter_username("ada").await?
//!     .enter_password("secret").await?
//!     .submit().await?;
//! home.side_menu()?.open_reports().await?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::TestConfiguration;
use crate::driver::{DriverRef, PageDriver};
use crate::error::{Error, Result};
use crate::locator::Locator;

/// A page or component of the application under test.
pub trait PageObject: Send + Sync + Sized + 'static {
    /// Build the page object. Called at most once per factory.
    fn create(ctx: PageContext) -> Result<Self>;
}

type CachedPage = Arc<dyn Any + Send + Sync>;

struct FactoryInner {
    driver: DriverRef,
    config: Arc<TestConfiguration>,
    cache: Mutex<HashMap<TypeId, CachedPage>>,
    // Types whose constructor is running, per thread; a repeat is a cycle.
    building: Mutex<HashSet<(TypeId, ThreadId)>>,
}

/// Marks a type as under construction until dropped.
struct Building<'a> {
    set: &'a Mutex<HashSet<(TypeId, ThreadId)>>,
    key: (TypeId, ThreadId),
}

impl<'a> Building<'a> {
    fn enter(set: &'a Mutex<HashSet<(TypeId, ThreadId)>>, page: TypeId) -> Option<Self> {
        let key = (page, thread::current().id());
        set.lock().insert(key).then(|| Self { set, key })
    }
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Everything a page object needs: the page, the settings, and a way back
/// to the factory for navigation.
#[derive(Clone)]
pub struct PageContext {
    driver: DriverRef,
    config: Arc<TestConfiguration>,
    // Weak so cached pages do not keep their own factory alive.
    factory: Weak<FactoryInner>,
}

impl PageContext {
    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn driver_ref(&self) -> DriverRef {
        Arc::clone(&self.driver)
    }

    pub fn config(&self) -> &TestConfiguration {
        &self.config
    }

    pub fn locator(&self, selector: impl Into<String>) -> Locator {
        Locator::new(Arc::clone(&self.driver), Arc::clone(&self.config), selector)
    }

    /// The cached instance of another page object.
    pub fn page<T: PageObject>(&self) -> Result<Arc<T>> {
        let inner = self.factory.upgrade().ok_or(Error::SessionClosed)?;
        PageFactory { inner }.page::<T>()
    }

    /// Navigate to `path` relative to the application's base URL.
    pub async fn open(&self, path: &str) -> Result<()> {
        let url = self.config.application.url(path);
        self.driver.goto(&url).await
    }
}

#[derive(Clone)]
pub struct PageFactory {
    inner: Arc<FactoryInner>,
}

impl PageFactory {
    pub fn new(driver: DriverRef, config: Arc<TestConfiguration>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                driver,
                config,
                cache: Mutex::new(HashMap::new()),
                building: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn context(&self) -> PageContext {
        PageContext {
            driver: Arc::clone(&self.inner.driver),
            config: Arc::clone(&self.inner.config),
            factory: Arc::downgrade(&self.inner),
        }
    }

    /// The instance of `T` for this factory, built on first request.
    pub fn page<T: PageObject>(&self) -> Result<Arc<T>> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.inner.cache.lock().get(&key).cloned() {
            return downcast::<T>(cached);
        }

        // Built without holding the lock: a constructor may ask for other pages.
        let Some(_building) = Building::enter(&self.inner.building, key) else {
            return Err(Error::PageConstruction {
                page: type_name::<T>(),
                reason: "cyclic dependency between page object constructors".into(),
            });
        };
        debug!(page = type_name::<T>(), "constructing page object");
        let page = T::create(self.context()).map_err(|e| Error::PageConstruction {
            page: type_name::<T>(),
            reason: e.to_string(),
        })?;

        let entry = self
            .inner
            .cache
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(page) as CachedPage)
            .clone();
        downcast::<T>(entry)
    }

    pub fn cached_count(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// Drop every cached page; the next request builds fresh instances.
    pub fn clear(&self) {
        self.inner.cache.lock().clear();
    }
}

fn downcast<T: PageObject>(page: CachedPage) -> Result<Arc<T>> {
    page.downcast::<T>().map_err(|_| Error::PageConstruction {
        page: type_name::<T>(),
        reason: "cached instance has a different type".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::MockDriver;

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl PageObject for Counted {
        fn create(_ctx: PageContext) -> Result<Self> {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Ok(Counted)
        }
    }

    struct Broken;

    impl PageObject for Broken {
        fn create(_ctx: PageContext) -> Result<Self> {
            Err(Error::Config("missing selector table".into()))
        }
    }

    struct Header {
        ctx: PageContext,
    }

    impl PageObject for Header {
        fn create(ctx: PageContext) -> Result<Self> {
            Ok(Header { ctx })
        }
    }

    struct Shell {
        header: Arc<Header>,
    }

    impl PageObject for Shell {
        fn create(ctx: PageContext) -> Result<Self> {
            Ok(Shell {
                header: ctx.page::<Header>()?,
            })
        }
    }

    struct Ping {
        _pong: Arc<Pong>,
    }

    impl PageObject for Ping {
        fn create(ctx: PageContext) -> Result<Self> {
            Ok(Ping {
                _pong: ctx.page::<Pong>()?,
            })
        }
    }

    struct Pong {
        _ping: Arc<Ping>,
    }

    impl PageObject for Pong {
        fn create(ctx: PageContext) -> Result<Self> {
            Ok(Pong {
                _ping: ctx.page::<Ping>()?,
            })
        }
    }

    fn factory() -> PageFactory {
        PageFactory::new(
            Arc::new(MockDriver::new()),
            Arc::new(TestConfiguration::default()),
        )
    }

    #[test]
    fn same_type_returns_same_instance() {
        let factory = factory();
        let before = BUILT.load(Ordering::SeqCst);
        let a = factory.page::<Counted>().unwrap();
        let b = factory.page::<Counted>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(BUILT.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn separate_factories_do_not_share_pages() {
        let a = factory().page::<Header>().unwrap();
        let b = factory().page::<Header>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn constructor_failure_names_the_page() {
        let err = factory().page::<Broken>().err().unwrap();
        match err {
            Error::PageConstruction { page, reason } => {
                assert!(page.ends_with("Broken"));
                assert!(reason.contains("missing selector table"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn constructors_can_request_other_pages() {
        let factory = factory();
        let shell = factory.page::<Shell>().unwrap();
        let header = factory.page::<Header>().unwrap();
        assert!(Arc::ptr_eq(&shell.header, &header));
        assert_eq!(factory.cached_count(), 2);
    }

    #[test]
    fn mutually_dependent_pages_fail_instead_of_recursing() {
        let factory = factory();
        let err = factory.page::<Ping>().err().unwrap();
        match err {
            Error::PageConstruction { page, reason } => {
                assert!(page.ends_with("Ping"));
                assert!(reason.contains("cyclic dependency"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(factory.cached_count(), 0);

        // The guard is released, so unrelated pages still build.
        assert!(factory.page::<Header>().is_ok());
    }

    #[test]
    fn cached_pages_do_not_keep_the_factory_alive() {
        let factory = factory();
        let header = factory.page::<Header>().unwrap();
        drop(factory);
        assert!(matches!(header.ctx.page::<Shell>(), Err(Error::SessionClosed)));
    }

    #[test]
    fn clear_rebuilds_on_next_request() {
        let factory = factory();
        let first = factory.page::<Header>().unwrap();
        factory.clear();
        assert_eq!(factory.cached_count(), 0);
        let second = factory.page::<Header>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn open_joins_the_base_url() {
        let driver = Arc::new(MockDriver::new());
        let factory = PageFactory::new(driver.clone(), Arc::new(TestConfiguration::default()));
        factory.context().open("/login").await.unwrap();
        assert_eq!(driver.url().await.unwrap(), "http://localhost:3000/login");
    }
}
