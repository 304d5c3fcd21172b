//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象，用于封装不可变的概念性值与校验逻辑。
//!

use std::fmt;

use stagehand_macros::value_object;

/// 值对象抽象
pub trait ValueObject {
    /// 业务校验失败时的错误类型
    type Error;

    /// 创建值对象时进行验证
    fn validate(&self) -> Result<(), Self::Error>;
}

/// 版本号（乐观并发控制）
///
/// 由服务端在每次接受更新时递增，客户端只观察、从不自行推进。
/// `0` 专用于尚未被服务端确认的临时（provisional）记录，已确认记录从 `1` 开始。
///
/// # 示例
///
/// ```
/// use stagehand_domain::value_object::Version;
///
/// let v1 = Version::initial();
/// assert_eq!(v1.value(), 1);
/// assert!(v1.is_confirmed());
///
/// let v2 = v1.next();
/// assert_eq!(v2.value(), 2);
/// assert!(v2 > v1);
///
/// assert!(Version::PROVISIONAL.is_provisional());
/// ```
#[value_object(copy, ordered)]
pub struct Version(u64);

impl Version {
    /// 临时记录的版本号
    pub const PROVISIONAL: Self = Self(0);

    /// 服务端创建实体时分配的首个版本
    pub const fn initial() -> Self {
        Self(1)
    }

    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// 服务端接受一次更新后的版本（仅服务端/测试桩使用）
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn is_provisional(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_confirmed(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self::from_value(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.value()
    }
}
