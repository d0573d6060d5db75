//! 主应用程序入口
//!
//! 加载配置，装配连接中枢与验证码服务，启动 Axum Web 服务。

use std::sync::Arc;

use application::verification::{spawn_sweeper, MemoryVerificationStore};
use application::{
    ChatHub, ChatHubDependencies, Clock, DeliveryMode, HubOptions, PhoneVerificationService,
    PhoneVerificationServiceDependencies, SmsSender, SystemClock, UserStatusStore,
    VerificationPolicy, VerificationStore,
};
use config::AppConfig;
use infrastructure::{
    LoggingSmsSender, RedisUserStatusStore, RedisVerificationStore, TwilioCredentials,
    TwilioSmsSender,
};
use tracing_subscriber::EnvFilter;
use web_api::{cors_layer, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(environment = ?config.environment, "配置加载完成");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 配置了 Redis 时验证码和在线状态都存入 Redis，否则在线状态只在内存中跟踪
    let (store, status_store): (Arc<dyn VerificationStore>, Option<Arc<dyn UserStatusStore>>) =
        match &config.redis {
            Some(redis) => {
                tracing::info!("使用 Redis 存储验证码和在线状态");
                let status_store: Arc<dyn UserStatusStore> =
                    Arc::new(RedisUserStatusStore::new(redis)?);
                (
                    Arc::new(RedisVerificationStore::new(redis)?) as Arc<dyn VerificationStore>,
                    Some(status_store),
                )
            }
            None => {
                tracing::info!("使用内存存储验证码，在线状态不做持久化");
                (Arc::new(MemoryVerificationStore::new()) as Arc<dyn VerificationStore>, None)
            }
        };

    let sms: Arc<dyn SmsSender> = match TwilioCredentials::from_config(&config.sms) {
        Some(credentials) => Arc::new(TwilioSmsSender::new(&config.sms.api_base, credentials)?),
        None => {
            tracing::warn!("未配置短信服务商凭据，短信内容只写入日志");
            Arc::new(LoggingSmsSender)
        }
    };

    let delivery = if config.is_production() {
        DeliveryMode::Sms
    } else {
        DeliveryMode::Echo
    };

    let verification = Arc::new(PhoneVerificationService::new(
        PhoneVerificationServiceDependencies {
            store: store.clone(),
            sms,
            clock: clock.clone(),
            policy: VerificationPolicy {
                code_ttl: config.verification.code_ttl(),
                delivery,
                app_name: config.sms.app_name.clone(),
            },
        },
    ));

    let sweeper = config
        .verification
        .sweep_interval()
        .map(|every| spawn_sweeper(store, clock.clone(), every));

    let hub = Arc::new(ChatHub::new(ChatHubDependencies {
        clock,
        status_store,
        options: HubOptions {
            broadcast_duplicate_presence: config.presence.broadcast_duplicates,
            offline_on_last_session: config.presence.offline_on_last_session,
        },
    }));

    let state = AppState::new(hub, verification, config.websocket.clone());
    let app = router(state).layer(cors_layer(&config.server.cors_origins));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("聊天室服务器启动在 http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("服务器已停止");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        return;
    }
    tracing::info!("收到关闭信号，正在停止服务");
}
