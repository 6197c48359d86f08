use crate::query::{Operation, Query};

const FEATURES: &[(&str, bool)] = &[
    ("rweb_tipjar_consumption_enabled", true),
    ("responsive_web_graphql_exclude_directive_enabled", true),
    ("verified_phone_label_enabled", false),
    ("creator_subscriptions_tweet_preview_api_enabled", true),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("communities_web_enable_tweet_community_results_fetch", true),
    ("c9s_tweet_anatomy_moderator_badge_enabled", true),
    ("articles_preview_enabled", true),
    ("tweetypie_unmention_optimization_enabled", true),
    ("responsive_web_edit_tweet_api_enabled", true),
    ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
    ("view_counts_everywhere_api_enabled", true),
    ("longform_notetweets_consumption_enabled", true),
    ("responsive_web_twitter_article_tweet_consumption_enabled", true),
    ("tweet_awards_web_tipping_enabled", false),
    ("freedom_of_speech_not_reach_fetch_enabled", true),
    ("standardized_nudges_misinfo", true),
    ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
    ("longform_notetweets_rich_text_read_enabled", true),
    ("longform_notetweets_inline_media_enabled", true),
    ("responsive_web_enhance_cards_enabled", false),
];

const USER_FEATURES: &[(&str, bool)] = &[
    ("hidden_profile_subscriptions_enabled", true),
    ("rweb_tipjar_consumption_enabled", true),
    ("responsive_web_graphql_exclude_directive_enabled", true),
    ("verified_phone_label_enabled", false),
    ("highlights_tweets_tab_ui_enabled", true),
    ("responsive_web_twitter_article_notes_tab_enabled", true),
    ("subscriptions_feature_can_gift_premium", true),
    ("creator_subscriptions_tweet_preview_api_enabled", true),
    ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
    ("responsive_web_graphql_timeline_navigation_enabled", true),
];

pub const SEARCH_TIMELINE: Operation = Operation {
    name: "SearchTimeline",
    query_id: "flaR-PUMshxFWZWPNpq4zA",
    features: FEATURES,
};

pub const TWEET_RESULT_BY_REST_ID: Operation = Operation {
    name: "TweetResultByRestId",
    query_id: "Xl5pC_lBk_gcO2ItU39DQw",
    features: FEATURES,
};

pub const USER_BY_REST_ID: Operation = Operation {
    name: "UserByRestId",
    query_id: "tD8zKvQzwY3kdx5yz6YmOw",
    features: USER_FEATURES,
};

pub const ABOUT_ACCOUNT: Operation = Operation {
    name: "AboutAccountQuery",
    query_id: "zs_jFPFT78rBpXv9Z3U2YQ",
    features: &[],
};

/// Search ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProduct {
    Top,
    Latest,
}

impl SearchProduct {
    fn as_str(self) -> &'static str {
        match self {
            Self::Top => "Top",
            Self::Latest => "Latest",
        }
    }
}

pub fn search_tweets(raw_query: &str, product: SearchProduct, count: usize) -> Query {
    Query::new(SEARCH_TIMELINE)
        .param("rawQuery", raw_query)
        .count(count)
        .param("querySource", "typed_query")
        .param("product", product.as_str())
}

/// Tweets quoting `tweet_id`, newest first.
pub fn tweet_quotes(tweet_id: &str, count: usize) -> Query {
    search_tweets(&format!("quoted_tweet_id:{tweet_id}"), SearchProduct::Latest, count)
}

pub fn tweet_by_id(tweet_id: &str) -> Query {
    Query::new(TWEET_RESULT_BY_REST_ID)
        .param("tweetId", tweet_id)
        .param("withCommunity", false)
        .param("includePromotedContent", false)
        .param("withVoice", false)
}

pub fn user_by_id(user_id: &str) -> Query {
    Query::new(USER_BY_REST_ID)
        .param("userId", user_id)
        .param("withSafetyModeUserFields", true)
}

pub fn about_account(screen_name: &str) -> Query {
    Query::new(ABOUT_ACCOUNT).param("screenName", screen_name)
}
