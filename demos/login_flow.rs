//! Log in, then open a report from the side menu.
//!
//! Expects a `pageflow.toml` (or `$PAGEFLOW_CONFIG`) whose
//! `[test_settings.application]` points at the application and carries the
//! credentials, e.g. through `PAGEFLOW_USERNAME` / `PAGEFLOW_PASSWORD`.

use std::sync::Arc;

use pageflow::config;
use pageflow::{Error, Locator, PageContext, PageObject, Result, TestSuite};

struct LoginPage {
    ctx: PageContext,
    username: Locator,
    password: Locator,
    submit: Locator,
}

impl PageObject for LoginPage {
    fn create(ctx: PageContext) -> Result<Self> {
        Ok(Self {
            username: ctx.locator("input[name='username']"),
            password: ctx.locator("input[name='password']"),
            submit: ctx.locator("button[type='submit']"),
            ctx,
        })
    }
}

impl LoginPage {
    async fn open(&self) -> Result<&Self> {
        self.ctx.open("/login").await?;
        Ok(self)
    }

    async fn enter_username(&self, username: &str) -> Result<&Self> {
        self.username.fill_first_visible(username).await?;
        Ok(self)
    }

    async fn enter_password(&self, password: &str) -> Result<&Self> {
        self.password.fill_first_visible(password).await?;
        Ok(self)
    }

    async fn submit(&self) -> Result<Arc<HomePage>> {
        if !self.submit.click_only_visible().await? {
            // Some themes hide the button behind an overlay.
            self.submit.js_click().await?;
        }
        self.ctx.page::<HomePage>()
    }
}

struct HomePage {
    ctx: PageContext,
    greeting: Locator,
}

impl PageObject for HomePage {
    fn create(ctx: PageContext) -> Result<Self> {
        Ok(Self {
            greeting: ctx.locator(".greeting"),
            ctx,
        })
    }
}

impl HomePage {
    async fn greeting(&self) -> Result<String> {
        self.greeting.wait_for_visible().await?;
        self.greeting.text().await
    }

    fn side_menu(&self) -> Result<Arc<SideMenu>> {
        self.ctx.page::<SideMenu>()
    }
}

struct SideMenu {
    reports: Locator,
}

impl PageObject for SideMenu {
    fn create(ctx: PageContext) -> Result<Self> {
        Ok(Self {
            reports: ctx.locator("nav.side-menu a[href$='/reports']"),
        })
    }
}

impl SideMenu {
    async fn open_reports(&self) -> Result<&Self> {
        self.reports.click_first_visible().await?;
        Ok(self)
    }
}

async fn login_and_open_reports(suite: &TestSuite) -> Result<()> {
    let app = &suite.config().application;
    let (Some(username), Some(password)) = (app.username.clone(), app.password.clone()) else {
        return Err(Error::Config("username and password are required".into()));
    };

    let test = suite.start_test("demo::login_and_open_reports").await?;
    test.run(|ctx| async move {
        let home = ctx
            .page::<LoginPage>()?
            .open()
            .await?
            .enter_username(&username)
            .await?
            .enter_password(&password)
            .await?
            .submit()
            .await?;
        println!("{}", home.greeting().await?);
        home.side_menu()?.open_reports().await?;
        Ok::<_, Error>(())
    })
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let suite = TestSuite::setup(config::config_path()).await?;
    let result = login_and_open_reports(&suite).await;
    suite.teardown().await?;
    result
}
