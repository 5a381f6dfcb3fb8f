use std::net::SocketAddr;

use bytes::Bytes;
use flare_core::OwnerTag;

/// 归一化后的事件记录，编排层只面向它编程，不感知后端事件形态。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MuxEvent {
    pub owner: OwnerTag,
    pub kind: MuxEventKind,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MuxEventKind {
    /// 监听套接字上有待受理的连接（仅就绪式后端）。
    Connect,
    /// 流套接字可读。就绪式后端不携带载荷，由会话自行读取；
    /// 完成式后端携带已经读出的字节。
    Read { payload: Option<Bytes> },
    /// 数据报套接字可读或已读出一个数据报。
    Datagram {
        payload: Option<Bytes>,
        peer: Option<SocketAddr>,
    },
    /// 对端关闭或读失败（仅完成式后端显式上报）。
    Disconnect,
}
