//! Friends Radar CLI 客户端
//!
//! 非交互式 CLI：每次执行一个命令，先加载本地数据并与服务器对齐，
//! 执行完命令后等待后台同步结束再退出。`watch` 持续轮询并打印变更。

use anyhow::Result;
use clap::{Parser, Subcommand};
use friends_radar_sync::radar::friend::models::now_millis;
use friends_radar_sync::radar::overdue::{reminder_text, ContactColor};
use friends_radar_sync::{AuthSession, ClientConfig, FriendListener, RadarClient, UserIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Friends Radar CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "friends-radar")]
#[command(about = "Friends Radar CLI - 记录上次联系好友的时间并提醒你", long_about = None)]
struct Args {
    /// 用户 ID（作用域）；不指定时尝试从 token 解析或恢复上次登录的用户
    #[arg(short, long, global = true)]
    user_id: Option<String>,

    /// API bearer token（Google ID Token）
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// API 基础地址（默认读取 FRIENDS_RADAR_API_URL）
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// 本地数据库 URL（默认读取 FRIENDS_RADAR_DB_URL）
    #[arg(long, global = true)]
    db: Option<String>,

    /// 日志级别（默认: warn,friends_radar_sync=info）
    #[arg(long, global = true, default_value = "warn,friends_radar_sync=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出好友及联系状态
    List,
    /// 添加好友
    Add { name: String },
    /// 删除好友
    Remove { id: String },
    /// 记录刚刚联系过好友
    Touch { id: String },
    /// 列出需要联系的好友
    Overdue,
    /// 持续同步并打印变更
    Watch {
        /// 运行时长（秒），0 表示持续运行
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use anyhow::Context;
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("friends-radar.log")
        .context("无法创建日志文件 friends-radar.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// 打印同步事件的监听器
struct CliFriendListener;

#[async_trait::async_trait]
impl FriendListener for CliFriendListener {
    async fn on_friend_list_changed(&self, friends_json: String) {
        info!("[CLI/Friend] 👥 好友列表变更: {}", friends_json);
    }

    async fn on_sync_failed(&self, error: String) {
        warn!("[CLI/Friend] ⚠️ 同步失败: {}", error);
    }
}

/// 根据命令行参数确定登录身份
fn session_from_args(args: &Args) -> Option<AuthSession> {
    match (&args.user_id, &args.token) {
        (Some(user_id), token) => Some(AuthSession::new(
            UserIdentity {
                id: user_id.clone(),
                email: String::new(),
                name: String::new(),
                picture: None,
            },
            token.clone(),
        )),
        (None, Some(token)) => match AuthSession::from_id_token(token) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("[CLI] 无法从 token 解析用户，使用已保存的身份: {:#}", e);
                None
            }
        },
        (None, None) => None,
    }
}

fn color_mark(color: ContactColor) -> &'static str {
    match color {
        ContactColor::Green => "🟢",
        ContactColor::Yellow => "🟡",
        ContactColor::Red => "🔴",
    }
}

fn print_friends(client: &RadarClient) {
    let friends = client.syncer().friends();
    let now = now_millis();
    println!("好友列表（共 {} 个）:", friends.len());
    for friend in &friends {
        let color = client.config().overdue.contact_color(friend.last_contact, now);
        let days = now.saturating_sub(friend.last_contact).max(0) / DAY_MS;
        println!(
            "  {} {}  {}  {} 天前",
            color_mark(color),
            friend.id,
            friend.name,
            days
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let mut config = ClientConfig::from_env();
    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(db) = &args.db {
        config.db_url = db.clone();
    }

    let client = RadarClient::with_listener(config, Arc::new(CliFriendListener)).await?;
    match session_from_args(&args) {
        Some(session) => client.login(session).await,
        None => {
            if let Some(user) = client.start(args.token.as_deref()).await {
                info!("[CLI] 使用已保存的用户: {}", user.id);
            } else {
                info!("[CLI] 未登录，仅使用本地数据");
            }
        }
    }
    // 等待首次对齐完成
    client.syncer().settle().await;

    match args.command {
        Command::List => print_friends(&client),
        Command::Add { name } => match client.syncer().add_friend(&name).await {
            Some(friend) => println!("已添加: {} ({})", friend.name, friend.id),
            None => error!("[CLI] ❌ 名字不能为空"),
        },
        Command::Remove { id } => {
            client.syncer().remove_friend(&id).await;
            println!("已删除: {}", id);
        }
        Command::Touch { id } => match client.syncer().update_last_contact(&id).await {
            Some(friend) => println!("已记录联系: {}", friend.name),
            None => error!("[CLI] ❌ 好友不存在: {}", id),
        },
        Command::Overdue => {
            let overdue = client.overdue_friends();
            let refs: Vec<_> = overdue.iter().collect();
            match reminder_text(&refs) {
                Some(text) => {
                    println!("{}", text);
                    for friend in &overdue {
                        println!("  🔴 {}  {}", friend.id, friend.name);
                    }
                }
                None => println!("所有好友最近都联系过 👍"),
            }
        }
        Command::Watch { duration } => {
            print_friends(&client);
            if duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(duration)).await;
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                tokio::signal::ctrl_c().await?;
            }
            print_friends(&client);
            match client.syncer().last_remote_fetch() {
                Some(remote) => println!("服务器上共 {} 个好友", remote.len()),
                None => println!("尚未从服务器拉取过数据"),
            }
        }
    }

    if let Some(err) = client.syncer().last_sync_error() {
        warn!("[CLI] 最近一次同步错误: {}", err);
    }
    client.shutdown().await;
    info!("[CLI] 👋 程序退出");
    Ok(())
}
