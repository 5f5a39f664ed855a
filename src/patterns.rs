//! Multilingual phrase lists and the two matching primitives the classifier is
//! built on. Every list is stored lowercase; matching folds the input case only,
//! so accented and non-Latin phrases must match exactly as rendered.

pub const FEED_HEADER_TEXTS: &[&str] = &[
    // en
    "feed posts",
    "feeds",
    // vi
    "bài viết",
    "bảng tin",
    // zh-Hans
    "动态",
    "帖子",
    // zh-Hant
    "動態",
    "貼文",
    // ja
    "フィード",
    "投稿",
    // ko
    "피드",
    "게시물",
    // es
    "publicaciones",
    "noticias",
    // fr
    "publications",
    "fil d'actualité",
    // de
    "beiträge",
    "news feed",
    // pt
    "publicações",
    "feed de notícias",
    // th
    "โพสต์",
    "ฟีด",
    // id
    "postingan",
    "beranda",
];

pub const FOLLOW_BUTTON_TEXTS: &[&str] = &[
    "follow",
    "theo dõi",
    "关注",
    "追蹤",
    "フォロー",
    "팔로우",
    "seguir",
    "suivre",
    "folgen",
    "ติดตาม",
    "ikuti",
];

pub const SPONSORED_TEXTS: &[&str] = &[
    "sponsored",
    "được tài trợ",
    "赞助内容",
    "广告",
    "贊助",
    "廣告",
    "広告",
    "スポンサー",
    "광고",
    "스폰서",
    "publicidad",
    "patrocinado",
    "sponsorisé",
    "publicité",
    "gesponsert",
    "werbung",
    "โฆษณา",
    "bersponsor",
];

pub const SUGGESTED_FOR_YOU_TEXTS: &[&str] = &[
    "suggested for you",
    "your group suggestions",
    "gợi ý cho bạn",
    "đề xuất cho bạn",
    "gợi ý nhóm cho bạn",
    "为你推荐",
    "推荐给你",
    "你的群组推荐",
    "為你推薦",
    "推薦給你",
    "你的社團推薦",
    "おすすめ",
    "あなたへのおすすめ",
    "おすすめのグループ",
    "회원님을 위한 추천",
    "추천",
    "그룹 추천",
    "sugerido para ti",
    "sugerencias para ti",
    "sugerencias de grupos",
    "suggestions pour vous",
    "suggéré pour vous",
    "suggestions de groupes",
    "vorschläge für dich",
    "für dich vorgeschlagen",
    "gruppenvorschläge",
    "sugestão para você",
    "sugerido para você",
    "sugestões de grupos",
    "แนะนำสำหรับคุณ",
    "กลุ่มแนะนำของคุณ",
    "disarankan untuk anda",
    "saran untuk anda",
    "saran grup anda",
];

pub const PEOPLE_YOU_MAY_KNOW_TEXTS: &[&str] = &[
    "people you may know",
    "những người bạn có thể biết",
    "bạn có thể biết",
    "你可能认识的人",
    "你可能認識的人",
    "知り合いかも",
    "알 수도 있는 사람",
    "personas que quizá conozcas",
    "personas que quizás conozcas",
    "vous connaissez peut-être",
    "personen, die du kennen könntest",
    "pessoas que você talvez conheça",
    "คนที่คุณอาจรู้จัก",
    "orang yang mungkin anda kenal",
];

pub const GROUP_SUGGESTIONS_TEXTS: &[&str] = &[
    "suggested groups",
    "your group suggestions",
    "nhóm gợi ý",
    "gợi ý nhóm",
    "推荐小组",
    "你的群组推荐",
    "推薦社團",
    "你的社團推薦",
    "おすすめのグループ",
    "추천 그룹",
    "그룹 추천",
    "grupos sugeridos",
    "sugerencias de grupos",
    "groupes suggérés",
    "suggestions de groupes",
    "vorgeschlagene gruppen",
    "gruppenvorschläge",
    "sugestões de grupos",
    "กลุ่มแนะนำ",
    "grup yang disarankan",
    "saran grup",
];

pub const STORIES_TEXTS: &[&str] = &[
    "stories",
    "tin",
    "快拍",
    "限时动态",
    "限時動態",
    "ストーリーズ",
    "스토리",
    "historias",
    "histoires",
    "storys",
    "histórias",
    "สตอรี่",
    "cerita",
];

/// Lowercased, trimmed input contains one of `patterns`.
pub fn matches_any(text: Option<&str>, patterns: &[&str]) -> bool {
    let Some(text) = normalize(text) else {
        return false;
    };
    patterns
        .iter()
        .any(|pattern| text.contains(&pattern.to_lowercase()))
}

/// Lowercased, trimmed input equals one of `patterns`.
pub fn matches_exact(text: Option<&str>, patterns: &[&str]) -> bool {
    let Some(text) = normalize(text) else {
        return false;
    };
    patterns
        .iter()
        .any(|pattern| text == pattern.to_lowercase())
}

fn normalize(text: Option<&str>) -> Option<String> {
    let text = text?;
    if text.is_empty() {
        return None;
    }
    Some(text.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_text_never_matches() {
        assert!(!matches_any(None, SPONSORED_TEXTS));
        assert!(!matches_exact(None, SPONSORED_TEXTS));
        assert!(!matches_any(Some(""), SPONSORED_TEXTS));
        assert!(!matches_exact(Some(""), SPONSORED_TEXTS));
    }

    #[test]
    fn whitespace_only_text_does_not_match_exactly() {
        assert!(!matches_exact(Some("   "), SPONSORED_TEXTS));
    }

    #[test]
    fn exact_match_folds_case_and_trims() {
        assert!(matches_exact(Some("  SPONSORED "), SPONSORED_TEXTS));
        assert!(matches_exact(Some("Được tài trợ"), SPONSORED_TEXTS));
        assert!(!matches_exact(Some("Sponsored by Acme"), SPONSORED_TEXTS));
    }

    #[test]
    fn substring_match_finds_phrase_inside_text() {
        assert!(matches_any(
            Some("Feed posts and more"),
            FEED_HEADER_TEXTS
        ));
        assert!(matches_any(
            Some("See all People You May Know"),
            PEOPLE_YOU_MAY_KNOW_TEXTS
        ));
        assert!(!matches_any(Some("Marketplace"), FEED_HEADER_TEXTS));
    }

    #[test]
    fn matching_is_diacritic_sensitive() {
        assert!(!matches_exact(Some("sponsorise"), SPONSORED_TEXTS));
        assert!(matches_exact(Some("Sponsorisé"), SPONSORED_TEXTS));
    }

    #[test]
    fn every_list_covers_a_dozen_locales() {
        for list in [
            FEED_HEADER_TEXTS,
            FOLLOW_BUTTON_TEXTS,
            SPONSORED_TEXTS,
            SUGGESTED_FOR_YOU_TEXTS,
            PEOPLE_YOU_MAY_KNOW_TEXTS,
            GROUP_SUGGESTIONS_TEXTS,
            STORIES_TEXTS,
        ] {
            assert!(list.len() >= 11, "list too short: {list:?}");
            for pattern in list {
                assert_eq!(*pattern, pattern.to_lowercase());
            }
        }
    }
}
