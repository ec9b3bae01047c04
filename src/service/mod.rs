pub mod advisor;
pub mod filters;
pub mod kb_builder;
pub mod narrower;
pub mod pipeline;
pub mod query_loop;
pub mod value_matcher;
pub mod viz_loop;

use tracing::{debug, warn};

use crate::infra::oracle::GenerativeOracle;

/// 调用模型；失败时记录告警并返回 None，由调用方给出默认值
pub(crate) async fn ask(oracle: &dyn GenerativeOracle, step: &str, system: &str, user: &str) -> Option<String> {
    debug!("{} 请求载荷 {} 字符", step, user.len());
    match oracle.complete(system, user).await {
        Ok(text) => {
            debug!("{} 模型原始输出: {}", step, text);
            Some(text)
        }
        Err(e) => {
            warn!("{} 调用模型失败，使用默认值: {:#}", step, e);
            None
        }
    }
}
