//! Outbound command builders.
//!
//! Every function returns one wire line without the CRLF terminator; the
//! connection appends it when writing.

/// Capabilities requested from Twitch on connect.
pub const TWITCH_CAPS: [&str; 3] = ["twitch.tv/commands", "twitch.tv/tags", "twitch.tv/membership"];

fn channel_target(channel: &str) -> String {
    if channel.starts_with('#') {
        channel.to_owned()
    } else {
        format!("#{channel}")
    }
}

/// `PASS <password>`
pub fn pass(password: &str) -> String {
    format!("PASS {password}")
}

/// `NICK <nick>`
pub fn nick(nick: &str) -> String {
    format!("NICK {nick}")
}

/// `USER <nick> 0 * :<realname>`
pub fn user(nick: &str, realname: &str) -> String {
    format!("USER {nick} 0 * :{realname}")
}

/// `JOIN #a,#b`
pub fn join<S: AsRef<str>>(channels: &[S]) -> String {
    let list: Vec<String> = channels.iter().map(|c| channel_target(c.as_ref())).collect();
    format!("JOIN {}", list.join(","))
}

/// `PART #channel`
pub fn part(channel: &str) -> String {
    format!("PART {}", channel_target(channel))
}

/// `PRIVMSG <target> :<text>`
pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}")
}

/// `NOTICE <target> :<text>`
pub fn notice(target: &str, text: &str) -> String {
    format!("NOTICE {target} :{text}")
}

/// `MODE #channel <modes> [args]`
pub fn mode(channel: &str, modes: &str, args: Option<&str>) -> String {
    match args {
        Some(args) => format!("MODE {} {modes} {args}", channel_target(channel)),
        None => format!("MODE {} {modes}", channel_target(channel)),
    }
}

/// `KICK #channel <nick> [:reason]`
pub fn kick(channel: &str, nick: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("KICK {} {nick} :{reason}", channel_target(channel)),
        None => format!("KICK {} {nick}", channel_target(channel)),
    }
}

/// `PING :<token>`
pub fn ping(token: &str) -> String {
    format!("PING :{token}")
}

/// `PONG :<token>`
pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}

/// `CAP REQ :<caps...>`
pub fn cap_req(caps: &[&str]) -> String {
    format!("CAP REQ :{}", caps.join(" "))
}

/// `QUIT [:reason]`
pub fn quit(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("QUIT :{reason}"),
        None => "QUIT".to_owned(),
    }
}
