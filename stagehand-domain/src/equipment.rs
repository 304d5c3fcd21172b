//! 设备类型载荷
//!
//! 每种设备只声明自身字段与必填项；标识、版本与对账逻辑由引擎统一处理。
//!
use crate::identity::StableId;
use stagehand_macros::equipment;

#[equipment(type = "camera", prefix = "CAM ")]
pub struct Camera {
    #[required]
    pub model: String,
    pub lens: Option<String>,
    /// 所连接的 CCU
    pub ccu_id: Option<StableId>,
    pub operator: Option<String>,
    pub notes: Option<String>,
}

#[equipment(type = "ccu", prefix = "CCU ")]
pub struct Ccu {
    #[required]
    pub model: String,
    pub camera_id: Option<StableId>,
    pub fiber_channel: Option<u32>,
    pub notes: Option<String>,
}

#[equipment(type = "monitor", prefix = "MON ")]
pub struct Monitor {
    #[required]
    pub model: String,
    pub size_inches: Option<u16>,
    /// 当前路由到该监视器的信号源
    pub source_id: Option<StableId>,
    pub location: Option<String>,
}

#[equipment(type = "router", prefix = "RTR ")]
pub struct Router {
    #[required]
    pub model: String,
    pub inputs: u32,
    pub outputs: u32,
    pub location: Option<String>,
}

#[equipment(type = "cable_snake", prefix = "SNAKE ")]
pub struct CableSnake {
    /// fiber / copper / hybrid
    #[required]
    pub kind: String,
    pub length_m: Option<u32>,
    pub channels: Option<u32>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

#[equipment(type = "stream", prefix = "STREAM ")]
pub struct Stream {
    #[required]
    pub platform: String,
    pub url: Option<String>,
    pub source_id: Option<StableId>,
    pub bitrate_kbps: Option<u32>,
}

#[equipment(type = "source", prefix = "SRC ")]
pub struct Source {
    #[required]
    pub name: String,
    pub format: Option<String>,
    pub notes: Option<String>,
}
