//! /help command plugin.

use teloxide::prelude::*;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};

const USER_HELP: &str = "<b>📦 Help</b>

Open a link you were given to receive its files.

/search <i>name</i> - find shared files
/notify - turn expiry notices on or off";

const ADMIN_HELP: &str = "<b>Links</b>
/genlink - link for one message
/batch - range link from the first and last channel message
/custom_batch - collect messages into one link
/stop - finish collecting, /cancel - abort

<b>Captions</b>
/caption - current settings and apply order
/striplinks on|off
/customcaption <i>template</i> ({filename}, {previouscaption})
/globalcap <i>text</i>|on|off
/replace <i>old</i> | <i>new</i>
/linkreplace <i>old</i> | <i>new</i>
/replaceall <i>url</i>|on|off
/append <i>text</i>
/protect on|off

<b>Delivery</b>
/settimer 2h|30m|1d|off
/recopy allow|deny|ask
/sharebutton on|off

<b>Users</b>
/ban, /unban <i>user_id</i>
/addchannel, /delchannel <i>chat_id</i>
/channels

<b>Maintenance</b>
/stats, /backup";

/// Handle /help. Admins also see their commands.
pub async fn help_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let is_admin = match msg.from.as_ref() {
        Some(user) => state.is_admin(user.id.0).await,
        None => false,
    };

    let text = if is_admin {
        format!("{}\n\n{}", USER_HELP, ADMIN_HELP)
    } else {
        USER_HELP.to_string()
    };
    reply_html(&bot, &msg, text).await?;
    Ok(())
}
